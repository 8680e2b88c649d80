pub mod post;
pub mod pre;

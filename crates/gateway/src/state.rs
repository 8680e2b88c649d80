use inference::{Renderer, SharedDetector};

/// Shared handler state, built once in `main`.
///
/// `detector` is `None` when the model failed to load at startup; it is never
/// reloaded.
#[derive(Clone)]
pub struct AppState {
    pub detector: Option<SharedDetector>,
    pub renderer: Renderer,
}

impl AppState {
    pub fn new(detector: Option<SharedDetector>) -> Self {
        Self {
            detector,
            renderer: Renderer::default(),
        }
    }

    pub fn with_class_names(mut self, class_names: Vec<String>) -> Self {
        self.renderer.class_names = class_names;
        self
    }
}

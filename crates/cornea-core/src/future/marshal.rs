use crate::executor::UiScheduler;

/// Listener adapters.
pub struct Listeners;

impl Listeners {
    /// Wrap `listener` so each invocation is posted to the UI scheduler
    /// instead of running inline.
    pub fn run_on_ui_thread<E: Clone + 'static>(
        scheduler: UiScheduler,
        listener: impl Fn(E) + 'static,
    ) -> impl Fn(&E) + 'static {
        let listener = std::rc::Rc::new(listener);
        move |event: &E| {
            let listener = std::rc::Rc::clone(&listener);
            let event = event.clone();
            scheduler.post(move || listener(event));
        }
    }
}

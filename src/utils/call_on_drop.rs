// Deferred cleanup, run exactly once when the guard goes away.

#[macro_export]
macro_rules! call_on_drop {
    ($f:expr) => {
        $crate::utils::call_on_drop::CallOnDrop::new(move || -> () { $f })
    };
}

#[macro_export]
macro_rules! unregister {
    ($f:expr) => {
        $f.cancel()
    };
}

pub struct CallOnDrop {
    f: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Drop for CallOnDrop {
    fn drop(&mut self) {
        if let Some(f) = self.f.take() {
            f();
        }
    }
}

impl CallOnDrop {
    pub fn new<F: FnOnce() + Send + Sync + 'static>(f: F) -> Self {
        Self {
            f: Some(Box::new(f)),
        }
    }

    /// Disarms the guard so nothing runs on drop.
    pub fn cancel(&mut self) {
        self.f = None;
    }
}

impl std::fmt::Debug for CallOnDrop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CallOnDrop {{ armed: {} }}", self.f.is_some())
    }
}

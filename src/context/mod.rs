//! Decoding context.
//!
//! A [`Context`] owns everything shared by one document session: the format
//! handler registry and the store of decoded resources. It is a single-owner
//! resource; the store sits behind a `RefCell`, so a context cannot be shared
//! between threads.

mod store;

pub use store::{ResourceKey, Store};

use std::cell::{RefCell, RefMut};
use std::sync::Arc;

use crate::device::ImageData;
use crate::error::{Error, Result};
use crate::handler::{DocumentHandler, HandlerRegistry};
use crate::options::{CacheBudget, SessionOptions};

/// The resource arena and handler registry for one session.
pub struct Context {
    options: SessionOptions,
    handlers: HandlerRegistry,
    store: RefCell<Store>,
}

impl Context {
    /// Create a context with no handlers registered.
    ///
    /// Fails with [`Error::ContextCreation`] when the options cannot back a
    /// working context.
    pub fn new(options: SessionOptions) -> Result<Self> {
        if options.cache_budget == CacheBudget::Bytes(0) {
            return Err(Error::ContextCreation(
                "resource store budget must be non-zero".to_string(),
            ));
        }

        log::debug!(
            "creating context (store budget: {:?})",
            options.cache_budget
        );

        Ok(Self {
            store: RefCell::new(Store::new(options.cache_budget)),
            handlers: HandlerRegistry::new(),
            options,
        })
    }

    /// Register the built-in document handlers.
    pub fn register_document_handlers(&mut self) {
        self.handlers.register_defaults();
    }

    /// Register an additional document handler.
    pub fn register_handler(&mut self, handler: Arc<dyn DocumentHandler>) {
        self.handlers.register(handler);
    }

    pub fn handlers(&self) -> &HandlerRegistry {
        &self.handlers
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    /// Mutable access to the resource store.
    ///
    /// Panics if the store is already borrowed; handlers must not hold the
    /// guard across device calls.
    pub fn store(&self) -> RefMut<'_, Store> {
        self.store.borrow_mut()
    }

    /// A cached decoded image, if present.
    pub fn cached_image(&self, key: &ResourceKey) -> Option<Arc<ImageData>> {
        self.store().get(key)
    }

    /// Cache a decoded image and hand it back.
    pub fn cache_image(&self, key: ResourceKey, image: ImageData) -> Arc<ImageData> {
        let image = Arc::new(image);
        self.store().insert(key, Arc::clone(&image));
        image
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        log::debug!(
            "dropping context ({} stored resources, {} bytes)",
            self.store.get_mut().len(),
            self.store.get_mut().used_bytes()
        );
    }
}

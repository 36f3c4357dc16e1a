//! Native session lifecycle
//!
//! The native layer is owned by exactly one [`SessionManager`], created at
//! startup and injected (by `&mut` borrow) into everything that needs to
//! talk to controllers. The lifecycle is a statum typestate:
//!
//! ```text
//! Starting ──initialize──► Active ──shutdown──► Closed
//! ```
//!
//! Dropping the manager shuts the session down, so teardown also happens
//! when a later startup stage fails.

use crate::error::SessionError;
use crate::native::NativeInput;
use statum::{machine, state};
use tracing::{debug, info};

#[state]
#[derive(Debug, Clone)]
pub enum SessionState {
    Starting,
    Active,
    Closed,
}

#[machine]
pub struct NativeSession<S: SessionState> {
    native: Box<dyn NativeInput>,
}

impl NativeSession<Starting> {
    pub fn create(native: Box<dyn NativeInput>) -> Self {
        debug!("Creating native input session");
        Self::new(native)
    }

    /// Starts the native layer and transitions to `Active`.
    pub fn initialize(mut self) -> Result<NativeSession<Active>, SessionError> {
        info!("Initializing native input session");
        self.native.init().map_err(SessionError::Unavailable)?;
        info!("Native input session active");
        Ok(self.transition())
    }
}

impl NativeSession<Active> {
    pub fn native(&mut self) -> &mut dyn NativeInput {
        self.native.as_mut()
    }

    pub fn native_ref(&self) -> &dyn NativeInput {
        self.native.as_ref()
    }

    /// Releases all native resources.
    pub fn shutdown(mut self) -> NativeSession<Closed> {
        info!("Shutting down native input session");
        self.native.shutdown();
        self.transition()
    }
}

/// Owner of the active session; `shutdown` is idempotent and runs on drop.
pub struct SessionManager {
    active: Option<NativeSession<Active>>,
}

impl SessionManager {
    /// Starts a session over `native`.
    ///
    /// # Errors
    ///
    /// [`SessionError::Unavailable`] if the native layer cannot start.
    pub fn initialize(native: Box<dyn NativeInput>) -> Result<Self, SessionError> {
        let active = NativeSession::create(native).initialize()?;
        Ok(Self {
            active: Some(active),
        })
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn native(&mut self) -> Result<&mut dyn NativeInput, SessionError> {
        self.active
            .as_mut()
            .map(|session| session.native())
            .ok_or(SessionError::Inactive)
    }

    pub fn native_ref(&self) -> Result<&dyn NativeInput, SessionError> {
        self.active
            .as_ref()
            .map(|session| session.native_ref())
            .ok_or(SessionError::Inactive)
    }

    pub fn shutdown(&mut self) {
        if let Some(session) = self.active.take() {
            let _closed = session.shutdown();
        } else {
            debug!("Session already shut down");
        }
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

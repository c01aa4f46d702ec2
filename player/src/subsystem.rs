//! Reference-counted bootstrap of the decode engine
//!
//! The engine must be entered before the first movie exists and exited after
//! the last one is gone. Every controller holds a [`SubsystemLease`]; the
//! first lease enters the engine and dropping the last one exits it.

use crate::Result;
use crate::engine::MovieEngine;
use std::cell::Cell;
use std::rc::Rc;

pub struct MediaSubsystem {
    engine: Rc<dyn MovieEngine>,
    users: Cell<usize>,
}

impl MediaSubsystem {
    pub fn new(engine: Rc<dyn MovieEngine>) -> Rc<Self> {
        Rc::new(Self {
            engine,
            users: Cell::new(0),
        })
    }

    /// Take a lease, entering the engine if this is the first one
    pub fn acquire(self: &Rc<Self>) -> Result<SubsystemLease> {
        if self.users.get() == 0 {
            self.engine.enter_movies()?;
            log::info!("Media subsystem started ({})", self.engine.name());
        }
        self.users.set(self.users.get() + 1);
        Ok(SubsystemLease {
            subsystem: Rc::clone(self),
        })
    }

    fn release(&self) {
        let remaining = self.users.get().saturating_sub(1);
        self.users.set(remaining);
        if remaining == 0 {
            self.engine.exit_movies();
            log::info!("Media subsystem stopped ({})", self.engine.name());
        }
    }

    /// Number of live leases
    pub fn users(&self) -> usize {
        self.users.get()
    }

    pub fn engine(&self) -> Rc<dyn MovieEngine> {
        Rc::clone(&self.engine)
    }

    pub fn version(&self) -> Option<u32> {
        self.engine.version()
    }
}

/// Keeps the engine entered while alive
pub struct SubsystemLease {
    subsystem: Rc<MediaSubsystem>,
}

impl SubsystemLease {
    pub fn subsystem(&self) -> &Rc<MediaSubsystem> {
        &self.subsystem
    }
}

impl Drop for SubsystemLease {
    fn drop(&mut self) {
        self.subsystem.release();
    }
}

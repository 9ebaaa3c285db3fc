//! Guards against applying a response for a request the user has moved past.
//!
//! A view captures a [`Ticket`] before it issues a request; when the response
//! arrives it applies it only if the ticket still matches the current
//! descriptor (post id, page index, search query, ...).

use std::sync::{Arc, RwLock};

/// Shared holder of the descriptor the view currently wants displayed.
#[derive(Debug)]
pub struct StalenessGuard<D> {
    current: Arc<RwLock<D>>,
}

impl<D: Clone + PartialEq> StalenessGuard<D> {
    pub fn new(initial: D) -> Self {
        Self {
            current: Arc::new(RwLock::new(initial)),
        }
    }

    /// Record that the view now wants `descriptor`.
    pub fn set(&self, descriptor: D) {
        if let Ok(mut current) = self.current.write() {
            *current = descriptor;
        }
    }

    /// The descriptor currently wanted, if the lock is healthy.
    pub fn current(&self) -> Option<D> {
        self.current.read().ok().map(|d| d.clone())
    }

    /// Set `descriptor` and return a ticket for the request about to start.
    pub fn begin(&self, descriptor: D) -> Ticket<D> {
        self.set(descriptor.clone());
        Ticket {
            descriptor,
            current: Arc::clone(&self.current),
        }
    }

    /// Ticket for whatever is current right now.
    pub fn capture(&self) -> Option<Ticket<D>> {
        self.current().map(|descriptor| Ticket {
            descriptor,
            current: Arc::clone(&self.current),
        })
    }
}

impl<D> Clone for StalenessGuard<D> {
    fn clone(&self) -> Self {
        Self {
            current: Arc::clone(&self.current),
        }
    }
}

/// Snapshot of the descriptor a request was issued for.
#[derive(Debug)]
pub struct Ticket<D> {
    descriptor: D,
    current: Arc<RwLock<D>>,
}

impl<D: PartialEq> Ticket<D> {
    /// The descriptor this ticket was issued for.
    pub fn descriptor(&self) -> &D {
        &self.descriptor
    }

    /// Whether the view still wants this request's result. Compares by value,
    /// so navigating away and back again makes an older ticket current.
    pub fn is_current(&self) -> bool {
        self.current
            .read()
            .map(|current| *current == self.descriptor)
            .unwrap_or(false)
    }

    /// Pass `value` through only if the ticket is still current.
    pub fn apply<T>(&self, value: T) -> Option<T> {
        if self.is_current() {
            Some(value)
        } else {
            tracing::debug!("discarding response for superseded request");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct CommentsView {
        post: u32,
        page: u32,
    }

    #[test]
    fn test_ticket_current_until_superseded() {
        let guard = StalenessGuard::new(CommentsView { post: 1, page: 0 });
        let ticket = guard.begin(CommentsView { post: 1, page: 1 });
        assert!(ticket.is_current());

        guard.set(CommentsView { post: 2, page: 0 });
        assert!(!ticket.is_current());
        assert_eq!(ticket.apply("page for post 1"), None);
    }

    #[test]
    fn test_late_response_for_old_page_is_discarded() {
        let guard = StalenessGuard::new(0u32);
        let slow = guard.begin(1);
        let fast = guard.begin(2);

        assert_eq!(fast.apply("page 2"), Some("page 2"));
        assert_eq!(slow.apply("page 1"), None);
        assert_eq!(guard.current(), Some(2));
    }

    #[test]
    fn test_returning_to_descriptor_revalidates() {
        let guard = StalenessGuard::new(String::from("rust"));
        let ticket = guard.capture().unwrap();
        guard.set("go".to_string());
        assert!(!ticket.is_current());
        guard.set("rust".to_string());
        assert!(ticket.is_current());
        assert_eq!(ticket.descriptor(), "rust");
    }

    #[test]
    fn test_clones_share_state() {
        let guard = StalenessGuard::new(0u32);
        let ticket = guard.capture().unwrap();
        guard.clone().set(5);
        assert!(!ticket.is_current());
    }
}

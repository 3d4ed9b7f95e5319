//! Ambient storage for the current unit of work
//!
//! Async units of work install their window with [`scope`] (task-local);
//! synchronous ones use [`sync_scope`] (thread-local). When neither is
//! installed, every access sees a fresh, empty window that is dropped
//! afterwards, so nothing carries over between unrelated units of work.
//!
//! Closures passed to [`with_current`] must not call back into it.

use std::cell::RefCell;
use std::future::Future;

use super::ConsistencyWindow;
use crate::classifier::Role;

tokio::task_local! {
    static TASK_WINDOW: RefCell<ConsistencyWindow>;
}

thread_local! {
    static THREAD_WINDOW: RefCell<Option<ConsistencyWindow>> = const { RefCell::new(None) };
    static PINNED_ROLES: RefCell<Vec<Role>> = const { RefCell::new(Vec::new()) };
}

/// Run `fut` with `window` as the current window of the task.
///
/// Returns the future's output and the window as the task left it.
pub async fn scope<F>(window: ConsistencyWindow, fut: F) -> (F::Output, ConsistencyWindow)
where
    F: Future,
{
    TASK_WINDOW
        .scope(RefCell::new(window), async move {
            let output = fut.await;
            let window = TASK_WINDOW.with(|cell| cell.take());
            (output, window)
        })
        .await
}

/// Run `f` with `window` as the current window of the thread.
pub fn sync_scope<R>(window: ConsistencyWindow, f: impl FnOnce() -> R) -> (R, ConsistencyWindow) {
    let previous = THREAD_WINDOW.with(|slot| slot.replace(Some(window)));
    let restore = RestoreThreadWindow {
        previous: Some(previous),
    };
    let output = f();
    (output, restore.finish())
}

struct RestoreThreadWindow {
    previous: Option<Option<ConsistencyWindow>>,
}

impl RestoreThreadWindow {
    fn finish(mut self) -> ConsistencyWindow {
        let previous = self.previous.take().flatten();
        THREAD_WINDOW
            .with(|slot| slot.replace(previous))
            .unwrap_or_default()
    }
}

impl Drop for RestoreThreadWindow {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            let _ = THREAD_WINDOW.try_with(|slot| *slot.borrow_mut() = previous);
        }
    }
}

/// Whether a task or thread scope is installed
pub fn in_scope() -> bool {
    TASK_WINDOW.try_with(|_| ()).is_ok() || THREAD_WINDOW.with(|slot| slot.borrow().is_some())
}

/// Access the current window.
///
/// Outside any scope `f` gets a temporary empty window and changes to it
/// are discarded.
pub fn with_current<R>(f: impl FnOnce(&mut ConsistencyWindow) -> R) -> R {
    if TASK_WINDOW.try_with(|_| ()).is_ok() {
        return TASK_WINDOW.with(|cell| f(&mut cell.borrow_mut()));
    }
    if THREAD_WINDOW.with(|slot| slot.borrow().is_none()) {
        return f(&mut ConsistencyWindow::new());
    }
    THREAD_WINDOW.with(|slot| match slot.borrow_mut().as_mut() {
        Some(window) => f(window),
        None => f(&mut ConsistencyWindow::new()),
    })
}

/// Copy of the current window
pub fn current() -> ConsistencyWindow {
    with_current(|window| window.clone())
}

/// Run `f` with every routed statement pinned to `role`.
///
/// Pins nest; the innermost wins. Thread-scoped, so `f` must not hand its
/// work to another thread and expect the pin to follow.
pub fn connected_to<R>(role: Role, f: impl FnOnce() -> R) -> R {
    PINNED_ROLES.with(|roles| roles.borrow_mut().push(role));
    let _pin = PopPin;
    f()
}

struct PopPin;

impl Drop for PopPin {
    fn drop(&mut self) {
        let _ = PINNED_ROLES.try_with(|roles| roles.borrow_mut().pop());
    }
}

/// Innermost active pin
pub fn pinned_role() -> Option<Role> {
    PINNED_ROLES.with(|roles| roles.borrow().last().copied())
}

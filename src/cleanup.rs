use crate::logger::{self, SharedLogger};
use futures::future::BoxFuture;
use std::fmt::Display;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

type Action = Box<dyn FnOnce() -> BoxFuture<'static, Result<(), String>> + Send>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// CleanupStack
// ---------------------------------------------------------------------------

struct Inner {
    actions: Mutex<Vec<Action>>,
    exit_hook: Mutex<Option<(ExitHooks, HookToken)>>,
    logger: SharedLogger,
}

/// LIFO queue of teardown actions.
///
/// Cloning yields another handle to the same queue.
#[derive(Clone)]
pub struct CleanupStack {
    inner: Arc<Inner>,
}

impl Default for CleanupStack {
    fn default() -> Self {
        Self::new(logger::noop())
    }
}

impl CleanupStack {
    pub fn new(logger: SharedLogger) -> Self {
        Self {
            inner: Arc::new(Inner {
                actions: Mutex::new(Vec::new()),
                exit_hook: Mutex::new(None),
                logger,
            }),
        }
    }

    /// Creates a stack that is also run by `hooks.run()`, unless
    /// [`CleanupStack::run_all`] is called first.
    pub fn with_exit_hook(logger: SharedLogger, hooks: &ExitHooks) -> Self {
        let stack = Self::new(logger);
        let token = hooks.register(&stack);
        *lock(&stack.inner.exit_hook) = Some((hooks.clone(), token));
        stack
    }

    pub fn register<F, Fut, E>(&self, action: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Display,
    {
        let action: Action = Box::new(move || {
            Box::pin(async move { action().await.map_err(|e| e.to_string()) })
        });
        lock(&self.inner.actions).push(action);
    }

    pub fn len(&self) -> usize {
        lock(&self.inner.actions).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_exit_hook_registered(&self) -> bool {
        lock(&self.inner.exit_hook).is_some()
    }

    /// Runs and drops every registered action, most recent first. A failing
    /// action is logged and the rest still run. Calling it again only runs
    /// actions registered in the meantime.
    pub async fn run_all(&self) {
        let hook = lock(&self.inner.exit_hook).take();
        if let Some((hooks, token)) = hook {
            hooks.unregister(&token);
        }

        loop {
            let action = lock(&self.inner.actions).pop();
            let Some(action) = action else {
                break;
            };
            if let Err(e) = action().await {
                self.inner.logger.error(&format!("cleanup action failed: {e}"));
            }
        }
    }
}

// ---------------------------------------------------------------------------
// ExitHooks
// ---------------------------------------------------------------------------

/// Registration of a [`CleanupStack`] in [`ExitHooks`].
#[derive(Debug, PartialEq, Eq)]
pub struct HookToken(u64);

/// Holds stacks weakly: a stack dropped without `run_all` is simply gone.
#[derive(Default)]
struct HooksInner {
    next_id: u64,
    stacks: Vec<(u64, Weak<Inner>)>,
}

/// Cleanup stacks to run when the program is about to exit, e.g. on Ctrl+C.
#[derive(Clone, Default)]
pub struct ExitHooks {
    inner: Arc<Mutex<HooksInner>>,
}

impl ExitHooks {
    pub fn new() -> Self {
        Self::default()
    }

    fn register(&self, stack: &CleanupStack) -> HookToken {
        let mut inner = lock(&self.inner);
        let id = inner.next_id;
        inner.next_id += 1;
        inner.stacks.retain(|(_, stack)| stack.strong_count() > 0);
        inner.stacks.push((id, Arc::downgrade(&stack.inner)));
        HookToken(id)
    }

    fn unregister(&self, token: &HookToken) -> bool {
        let mut inner = lock(&self.inner);
        let before = inner.stacks.len();
        inner.stacks.retain(|(id, _)| *id != token.0);
        inner.stacks.len() != before
    }

    /// Number of registered stacks that are still alive.
    pub fn len(&self) -> usize {
        lock(&self.inner)
            .stacks
            .iter()
            .filter(|(_, stack)| stack.strong_count() > 0)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Runs all registered stacks, most recently registered first.
    pub async fn run(&self) {
        let stacks = std::mem::take(&mut lock(&self.inner).stacks);
        for (_, stack) in stacks.into_iter().rev() {
            if let Some(inner) = stack.upgrade() {
                CleanupStack { inner }.run_all().await;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::testing::RecordingLogger;

    fn recorder(order: &Arc<Mutex<Vec<u32>>>, n: u32) -> impl FnOnce() -> futures::future::Ready<Result<(), String>> + Send + 'static {
        let order = Arc::clone(order);
        move || {
            order.lock().unwrap().push(n);
            futures::future::ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn test_runs_in_reverse_order_and_swallows_errors() {
        let logger = Arc::new(RecordingLogger::default());
        let stack = CleanupStack::new(logger.clone());
        let order = Arc::new(Mutex::new(Vec::new()));

        stack.register(recorder(&order, 4));
        {
            let order = Arc::clone(&order);
            stack.register(move || async move {
                order.lock().unwrap().push(3);
                Err::<(), _>("error in action #3")
            });
        }
        {
            let order = Arc::clone(&order);
            stack.register(move || async move {
                order.lock().unwrap().push(2);
                Err::<(), _>(std::io::Error::other("error in action #2"))
            });
        }
        stack.register(recorder(&order, 1));
        stack.register(recorder(&order, 0));

        assert!(order.lock().unwrap().is_empty());
        assert_eq!(stack.len(), 5);

        stack.run_all().await;

        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
        assert!(stack.is_empty());
        let messages = logger.messages();
        assert_eq!(messages.len(), 2);
        assert!(messages[0].contains("error in action #2"));
        assert!(messages[1].contains("error in action #3"));
    }

    #[tokio::test]
    async fn test_run_all_twice_runs_actions_once() {
        let stack = CleanupStack::default();
        let order = Arc::new(Mutex::new(Vec::new()));
        stack.register(recorder(&order, 1));

        stack.run_all().await;
        stack.run_all().await;

        assert_eq!(*order.lock().unwrap(), vec![1]);
    }

    #[tokio::test]
    async fn test_without_exit_hook() {
        let hooks = ExitHooks::new();
        let stack = CleanupStack::default();
        assert!(!stack.is_exit_hook_registered());
        assert!(hooks.is_empty());
    }

    #[tokio::test]
    async fn test_exit_hook_unregistered_by_manual_run() {
        let hooks = ExitHooks::new();
        let stack = CleanupStack::with_exit_hook(logger::noop(), &hooks);
        assert!(stack.is_exit_hook_registered());
        assert_eq!(hooks.len(), 1);

        stack.run_all().await;

        assert!(!stack.is_exit_hook_registered());
        assert!(hooks.is_empty());
    }

    #[tokio::test]
    async fn test_exit_hooks_run_registered_stacks() {
        let hooks = ExitHooks::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        let first = CleanupStack::with_exit_hook(logger::noop(), &hooks);
        first.register(recorder(&order, 1));
        let second = CleanupStack::with_exit_hook(logger::noop(), &hooks);
        second.register(recorder(&order, 2));
        let done = CleanupStack::with_exit_hook(logger::noop(), &hooks);
        done.register(recorder(&order, 3));
        done.run_all().await;

        hooks.run().await;

        assert_eq!(*order.lock().unwrap(), vec![3, 2, 1]);
        assert!(hooks.is_empty());
        assert!(!first.is_exit_hook_registered());

        // Already drained, running the stack again is a no-op.
        first.run_all().await;
        assert_eq!(order.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_dropped_stack_is_freed_and_skipped() {
        let hooks = ExitHooks::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        let stack = CleanupStack::with_exit_hook(logger::noop(), &hooks);
        stack.register(recorder(&order, 1));
        let inner = Arc::downgrade(&stack.inner);
        assert_eq!(hooks.len(), 1);

        drop(stack);

        assert!(inner.upgrade().is_none());
        assert!(hooks.is_empty());
        hooks.run().await;
        assert!(order.lock().unwrap().is_empty());
    }
}

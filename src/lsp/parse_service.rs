use crate::language::{ast::Ast, parser};
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;

type Backend = Arc<dyn Fn(&str) -> Option<Ast> + Send + Sync>;

/// Single-consumer wrapper over the parser backend. While a parse is in
/// flight, at most one request waits in the slot; a newcomer displaces the
/// occupant, which resolves with `None`. This keeps the backend at most one
/// buffer behind during rapid typing.
pub struct ParseService {
    state: Arc<Mutex<ServiceState>>,
    backend: Backend,
    batch: tokio::sync::Mutex<()>,
}

enum ServiceState {
    Idle,
    Busy { queued: Option<Queued> },
}

struct Queued {
    source: String,
    reply: oneshot::Sender<Option<Arc<Ast>>>,
}

impl Default for ParseService {
    fn default() -> Self {
        Self::with_backend(Arc::new(|source| parser::parse(source).ok()))
    }
}

impl ParseService {
    pub fn with_backend(backend: Backend) -> Self {
        Self {
            state: Arc::new(Mutex::new(ServiceState::Idle)),
            backend,
            batch: tokio::sync::Mutex::new(()),
        }
    }

    /// Latency-critical parse: latest-wins while the backend is busy.
    pub async fn parse(&self, source: String) -> Option<Arc<Ast>> {
        let (reply, result) = oneshot::channel();
        let request = Queued { source, reply };
        let run_now = {
            let mut state = self.state.lock().ok()?;
            match &mut *state {
                ServiceState::Idle => {
                    *state = ServiceState::Busy { queued: None };
                    Some(request)
                }
                ServiceState::Busy { queued } => {
                    if let Some(displaced) = queued.replace(request) {
                        let _ = displaced.reply.send(None);
                    }
                    None
                }
            }
        };
        if let Some(request) = run_now {
            self.spawn_worker(request);
        }
        result.await.unwrap_or(None)
    }

    /// Batch parse for workspace sweeps: serialized among batch callers,
    /// never touching the latest-wins slot.
    pub async fn parse_batch(&self, source: String) -> Option<Arc<Ast>> {
        let _guard = self.batch.lock().await;
        run_backend(&self.backend, source).await.unwrap_or(None)
    }

    fn spawn_worker(&self, first: Queued) {
        let state = Arc::clone(&self.state);
        let backend = Arc::clone(&self.backend);
        tokio::spawn(async move {
            let mut current = first;
            loop {
                match run_backend(&backend, current.source).await {
                    Ok(ast) => {
                        let _ = current.reply.send(ast);
                    }
                    Err(()) => {
                        // Backend died: resolve everything outstanding with
                        // `None`; the next `parse` restarts it lazily.
                        let _ = current.reply.send(None);
                        if let Ok(mut state) = state.lock() {
                            if let ServiceState::Busy { queued } = &mut *state {
                                if let Some(waiting) = queued.take() {
                                    let _ = waiting.reply.send(None);
                                }
                            }
                            *state = ServiceState::Idle;
                        }
                        return;
                    }
                }
                let next = {
                    let Ok(mut state) = state.lock() else {
                        return;
                    };
                    match &mut *state {
                        ServiceState::Busy { queued } => match queued.take() {
                            Some(next) => Some(next),
                            None => {
                                *state = ServiceState::Idle;
                                None
                            }
                        },
                        ServiceState::Idle => None,
                    }
                };
                match next {
                    Some(request) => current = request,
                    None => return,
                }
            }
        });
    }
}

async fn run_backend(backend: &Backend, source: String) -> Result<Option<Arc<Ast>>, ()> {
    let backend = Arc::clone(backend);
    tokio::task::spawn_blocking(move || backend(&source).map(Arc::new))
        .await
        .map_err(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;

    const MODULE_A: &str = "module A exposing (..)\n\na = 1\n";
    const MODULE_B: &str = "module B exposing (..)\n\nb = 2\n";
    const MODULE_C: &str = "module C exposing (..)\n\nc = 3\n";

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn latest_wins_displaces_the_queued_request() {
        let (started_tx, started_rx) = mpsc::channel::<()>();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let release_rx = Mutex::new(release_rx);
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::new(Mutex::new(Vec::<String>::new()));

        let backend_calls = Arc::clone(&calls);
        let backend_seen = Arc::clone(&seen);
        let service = Arc::new(ParseService::with_backend(Arc::new(move |source| {
            backend_calls.fetch_add(1, Ordering::SeqCst);
            backend_seen
                .lock()
                .expect("seen lock")
                .push(source.to_string());
            started_tx.send(()).expect("signal start");
            release_rx
                .lock()
                .expect("release lock")
                .recv()
                .expect("await release");
            parser::parse(source).ok()
        })));

        let first = tokio::spawn({
            let service = Arc::clone(&service);
            async move { service.parse(MODULE_A.to_string()).await }
        });
        // The backend now holds the first request.
        tokio::task::spawn_blocking({
            move || started_rx.recv().expect("first parse started")
        })
        .await
        .expect("join");

        let second = tokio::spawn({
            let service = Arc::clone(&service);
            async move { service.parse(MODULE_B.to_string()).await }
        });
        // Give the second request time to occupy the slot before the
        // third displaces it.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        let third = tokio::spawn({
            let service = Arc::clone(&service);
            async move { service.parse(MODULE_C.to_string()).await }
        });

        // The displaced request resolves with None before anything else
        // completes.
        assert!(second.await.expect("join second").is_none());

        release_tx.send(()).expect("release first");
        release_tx.send(()).expect("release third");
        let first = first.await.expect("join first").expect("first parses");
        assert_eq!(first.module_name(), "A");
        let third = third.await.expect("join third").expect("third parses");
        assert_eq!(third.module_name(), "C");

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        let seen = seen.lock().expect("seen lock");
        assert_eq!(seen.as_slice(), [MODULE_A, MODULE_C]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn backend_panic_resolves_with_none_and_recovers() {
        let calls = Arc::new(AtomicUsize::new(0));
        let backend_calls = Arc::clone(&calls);
        let service = ParseService::with_backend(Arc::new(move |source| {
            if backend_calls.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("backend crash");
            }
            parser::parse(source).ok()
        }));

        assert!(service.parse(MODULE_A.to_string()).await.is_none());
        let recovered = service
            .parse(MODULE_B.to_string())
            .await
            .expect("backend restarted");
        assert_eq!(recovered.module_name(), "B");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn parse_failures_resolve_with_none() {
        let service = ParseService::default();
        assert!(service.parse("not elm at all".to_string()).await.is_none());
        assert!(service
            .parse_batch("also not elm".to_string())
            .await
            .is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn batch_parses_bypass_the_slot() {
        let service = ParseService::default();
        let ast = service
            .parse_batch(MODULE_A.to_string())
            .await
            .expect("parses");
        assert_eq!(ast.module_name(), "A");
    }
}

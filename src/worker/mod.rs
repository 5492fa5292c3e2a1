//! The isolated worker.
//!
//! One dedicated OS thread owns every native handle and executes all
//! native calls; concurrent callers are serialized by its inbound queue.
//! Long-running ingest and generate calls poll their cancel port once per
//! decode iteration, which is the only point a call can end early.

pub(crate) mod message;

mod generate;
mod ingest;
mod registry;
mod state;

use std::cell::RefCell;
use std::os::raw::c_void;
use std::path::Path;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::config::{ContextParams, ModelParams};
use crate::error::Error;
use crate::native::{Backend, NativeModel};
use crate::sampler::SamplerChain;

use generate::GenerateEnd;
use message::{
    Control, ContextHandle, Envelope, ModelHandle, Outcome, Reply, RequestId, HANDSHAKE_ID,
};
use registry::StateRegistry;
use state::{ContextState, ModelState};

// A 32-bit request id travels as the loader progress callback's user_data
// pointer bit pattern; the pointer must be able to hold it.
const _: () = assert!(std::mem::size_of::<*mut c_void>() >= std::mem::size_of::<u32>());

thread_local! {
    // Populated for the lifetime of the worker loop so native callbacks
    // re-entering from the loader can enqueue responses without a side
    // table.
    static OUTBOUND: RefCell<Option<UnboundedSender<Envelope>>> = const { RefCell::new(None) };
}

unsafe extern "C" fn forward_load_progress(progress: f32, user_data: *mut c_void) -> bool {
    let id = user_data as usize as u32;
    OUTBOUND.with(|slot| {
        if let Some(outbound) = slot.borrow().as_ref() {
            let fraction = progress.clamp(0.0, 1.0);
            let _ = outbound.send(Envelope { id, body: Ok(Reply::LoadProgress(fraction)) });
        }
    });
    true
}

/// Single-shot cancellation signal, polled at the decode loops' yield
/// points. A dropped sender is not a cancellation; only an actual send is.
pub(crate) struct CancelToken {
    rx: oneshot::Receiver<()>,
    observed: bool,
}

impl CancelToken {
    fn new(rx: oneshot::Receiver<()>) -> Self {
        Self { rx, observed: false }
    }

    pub fn is_cancelled(&mut self) -> bool {
        if self.observed {
            return true;
        }
        match self.rx.try_recv() {
            Ok(()) => {
                self.observed = true;
                true
            }
            Err(oneshot::error::TryRecvError::Empty) => false,
            Err(oneshot::error::TryRecvError::Closed) => false,
        }
    }
}

/// Join handle for the worker thread. Reap it after `Client::shutdown`.
pub struct WorkerHandle {
    thread: std::thread::JoinHandle<()>,
}

impl WorkerHandle {
    /// Block until the worker thread exits.
    pub fn join(self) {
        let _ = self.thread.join();
    }
}

/// Spawn the worker thread with its control and reply queues.
pub(crate) fn spawn() -> Result<
    (UnboundedSender<Control>, UnboundedReceiver<Envelope>, WorkerHandle),
    Error,
> {
    let (control_tx, control_rx) = mpsc::unbounded_channel();
    let (reply_tx, reply_rx) = mpsc::unbounded_channel();
    let thread = std::thread::Builder::new()
        .name("kiln-worker".into())
        .spawn(move || Worker::new(reply_tx).run(control_rx))
        .map_err(|err| Error::WorkerSpawn(err.to_string()))?;
    Ok((control_tx, reply_rx, WorkerHandle { thread }))
}

struct Worker {
    registry: StateRegistry<ModelState, ContextState>,
    outbound: UnboundedSender<Envelope>,
    _backend: Backend,
}

impl Worker {
    fn new(outbound: UnboundedSender<Envelope>) -> Self {
        Self {
            registry: StateRegistry::new(),
            outbound,
            _backend: Backend::acquire(),
        }
    }

    fn run(mut self, mut inbound: UnboundedReceiver<Control>) {
        OUTBOUND.with(|slot| *slot.borrow_mut() = Some(self.outbound.clone()));
        self.send(HANDSHAKE_ID, Ok(Reply::Ready));
        info!("worker ready");

        while let Some(control) = inbound.blocking_recv() {
            debug!(id = control.id(), "control received");
            if let Control::Exit { id } = control {
                self.send(id, Ok(Reply::ExitDone));
                info!("worker exiting");
                break;
            }
            self.dispatch(control);
        }

        OUTBOUND.with(|slot| *slot.borrow_mut() = None);
        // Registry drop releases contexts before models; the backend guard
        // goes last.
    }

    fn send(&self, id: RequestId, body: Result<Reply, Error>) {
        if self.outbound.send(Envelope { id, body }).is_err() {
            debug!(id, "reply dropped: client router is gone");
        }
    }

    fn dispatch(&mut self, control: Control) {
        match control {
            // Handled by the run loop.
            Control::Exit { .. } => {}
            Control::LoadModel { id, path, params } => {
                let body = self.load_model(id, &path, &params).map(Reply::ModelLoaded);
                self.send(id, body);
            }
            Control::FreeModel { id, model } => {
                let body = self.registry.remove_model(model).map(|_state| Reply::ModelFreed);
                self.send(id, body);
            }
            Control::NewContext { id, model, params } => {
                let body = self.new_context(model, &params).map(Reply::ContextCreated);
                self.send(id, body);
            }
            Control::FreeContext { id, context } => {
                let body = self.registry.remove_context(context).map(|_state| Reply::ContextFreed);
                self.send(id, body);
            }
            Control::Tokenize { id, context, text } => {
                let body = self
                    .registry
                    .context_and_model(context)
                    .and_then(|(state, model)| state.tokenize_append(&model.native, &text))
                    .map(Reply::Tokenized);
                self.send(id, body);
            }
            Control::Edit { id, context, new_len } => {
                let body = self
                    .registry
                    .context_mut(context)
                    .and_then(|state| state.edit(new_len))
                    .map(|()| Reply::Edited);
                self.send(id, body);
            }
            Control::Ingest { id, context } => self.ingest(id, context),
            Control::Generate { id, context, chain } => self.generate(id, context, chain),
        }
    }

    fn load_model(
        &mut self,
        id: RequestId,
        path: &Path,
        params: &ModelParams,
    ) -> Result<ModelHandle, Error> {
        let user_data = id as usize as *mut c_void;
        let native = NativeModel::load(path, params, Some(forward_load_progress), user_data)?;
        info!(path = %path.display(), "model loaded");
        Ok(self.registry.insert_model(ModelState { native }))
    }

    fn new_context(
        &mut self,
        model: ModelHandle,
        params: &ContextParams,
    ) -> Result<ContextHandle, Error> {
        let state = {
            let model_state = self.registry.model(model)?;
            ContextState::create(&model_state.native, params)?
        };
        self.registry.insert_context(model, state)
    }

    fn ingest(&mut self, id: RequestId, context: ContextHandle) {
        let outbound = self.outbound.clone();
        let state = match self.registry.context_mut(context) {
            Ok(state) => state,
            Err(err) => return self.send(id, Err(err)),
        };

        let (cancel_tx, cancel_rx) = oneshot::channel();
        let _ = outbound.send(Envelope { id, body: Ok(Reply::Handshake(cancel_tx)) });

        let mut cancel = CancelToken::new(cancel_rx);
        match ingest::run(state, &mut cancel) {
            Ok(Outcome::Completed) => {
                let _ = outbound.send(Envelope { id, body: Ok(Reply::IngestDone) });
            }
            Ok(Outcome::Cancelled) => debug!(id, "ingest cancelled"),
            Err(err) => {
                warn!(id, %err, "ingest failed");
                let _ = outbound.send(Envelope { id, body: Err(err) });
            }
        }
    }

    fn generate(&mut self, id: RequestId, context: ContextHandle, mut chain: SamplerChain) {
        let outbound = self.outbound.clone();
        let (state, model) = match self.registry.context_and_model(context) {
            Ok(pair) => pair,
            Err(err) => return self.send(id, Err(err)),
        };
        if let Err(err) = generate::validate(state) {
            let _ = outbound.send(Envelope { id, body: Err(err) });
            return;
        }

        let (cancel_tx, cancel_rx) = oneshot::channel();
        let _ = outbound.send(Envelope { id, body: Ok(Reply::Handshake(cancel_tx)) });

        let mut cancel = CancelToken::new(cancel_rx);
        let mut emit = |reply: Reply| {
            let _ = outbound.send(Envelope { id, body: Ok(reply) });
        };
        match generate::run(state, &model.native, &mut chain, &mut cancel, &mut emit) {
            Ok(GenerateEnd::Finished(reason)) => emit(Reply::GenerateDone(reason)),
            Ok(GenerateEnd::Cancelled) => debug!(id, "generation cancelled"),
            Err(err) => {
                warn!(id, %err, "generation failed");
                let _ = outbound.send(Envelope { id, body: Err(err) });
            }
        }
    }
}

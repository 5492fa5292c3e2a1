//! Client façade: the async request/response surface over the worker.
//!
//! Each call mints a fresh random nonzero request id, publishes a control,
//! and a router task correlates response envelopes back to the awaiting
//! caller. Single-reply calls resolve one result; streaming calls resolve
//! to a handshake carrying a cancel handle, then events, then a terminal.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use rand::Rng;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::oneshot;
use tracing::debug;

use crate::config::{ContextParams, ModelParams};
use crate::error::Error;
use crate::sampler::SamplerChain;
use crate::token::Token;
use crate::worker::message::{
    ContextHandle, Control, Envelope, FinishReason, ModelHandle, Outcome, Reply, RequestId,
    Tokenized, HANDSHAKE_ID,
};
use crate::worker::{self, WorkerHandle};

type ReplyTx = UnboundedSender<Result<Reply, Error>>;
type ReplyRx = UnboundedReceiver<Result<Reply, Error>>;
type RouteMap = Arc<Mutex<HashMap<RequestId, ReplyTx>>>;

/// Asynchronous handle to the worker. Cheap to clone; every clone shares
/// the same worker thread and router.
#[derive(Clone)]
pub struct Client {
    controls: UnboundedSender<Control>,
    routes: RouteMap,
}

/// Cancels one streaming call. The worker stops at its next yield point
/// and emits no terminal; locally, the stream ends after any events
/// already in flight.
pub struct CancelHandle {
    signal: oneshot::Sender<()>,
    route: ReplyTx,
}

impl CancelHandle {
    pub fn cancel(self) {
        let _ = self.signal.send(());
        let _ = self.route.send(Ok(Reply::Cancelled));
    }
}

/// One registered request route; dropping it unregisters the id.
struct Route {
    id: RequestId,
    rx: ReplyRx,
    tx: ReplyTx,
    _guard: RouteGuard,
}

struct RouteGuard {
    id: RequestId,
    routes: RouteMap,
}

impl Drop for RouteGuard {
    fn drop(&mut self) {
        self.routes.lock().unwrap().remove(&self.id);
    }
}

impl Client {
    /// Spawn a worker thread and its response router; resolves once the
    /// worker reports ready.
    pub async fn start() -> Result<(Self, WorkerHandle), Error> {
        let (controls, replies, handle) = worker::spawn()?;
        let routes: RouteMap = Arc::new(Mutex::new(HashMap::new()));
        let client = Self { controls, routes: Arc::clone(&routes) };

        let (ready_tx, mut ready_rx) = mpsc::unbounded_channel();
        routes.lock().unwrap().insert(HANDSHAKE_ID, ready_tx);
        tokio::spawn(route_replies(replies, Arc::clone(&routes)));

        match ready_rx.recv().await {
            Some(Ok(Reply::Ready)) => {}
            _ => return Err(Error::ChannelClosed),
        }
        routes.lock().unwrap().remove(&HANDSHAKE_ID);
        Ok((client, handle))
    }

    /// Load model weights from `path`, discarding progress events.
    pub async fn load_model(
        &self,
        path: impl AsRef<Path>,
        params: &ModelParams,
    ) -> Result<ModelHandle, Error> {
        self.load_model_with_progress(path, params, |_| {}).await
    }

    /// Load model weights, feeding load fractions in `[0, 1]` to `progress`
    /// as they arrive.
    pub async fn load_model_with_progress(
        &self,
        path: impl AsRef<Path>,
        params: &ModelParams,
        mut progress: impl FnMut(f32),
    ) -> Result<ModelHandle, Error> {
        let mut route = self.open_route();
        let control = Control::LoadModel {
            id: route.id,
            path: path.as_ref().to_path_buf(),
            params: params.clone(),
        };
        self.controls.send(control).map_err(|_| Error::ChannelClosed)?;
        loop {
            match route.rx.recv().await.unwrap_or(Err(Error::ChannelClosed))? {
                Reply::LoadProgress(fraction) => progress(fraction),
                Reply::ModelLoaded(handle) => return Ok(handle),
                other => return Err(unexpected_reply("LoadModel", &other)),
            }
        }
    }

    /// Free model weights. Fails while any context still references them.
    pub async fn free_model(&self, model: ModelHandle) -> Result<(), Error> {
        match self.round_trip(|id| Control::FreeModel { id, model }).await? {
            Reply::ModelFreed => Ok(()),
            other => Err(unexpected_reply("FreeModel", &other)),
        }
    }

    /// Create an inference context bound to `model`.
    pub async fn new_context(
        &self,
        model: ModelHandle,
        params: &ContextParams,
    ) -> Result<ContextHandle, Error> {
        let params = params.clone();
        match self
            .round_trip(move |id| Control::NewContext { id, model, params })
            .await?
        {
            Reply::ContextCreated(handle) => Ok(handle),
            other => Err(unexpected_reply("NewContext", &other)),
        }
    }

    /// Free an inference context and all its buffers.
    pub async fn free_context(&self, context: ContextHandle) -> Result<(), Error> {
        match self.round_trip(|id| Control::FreeContext { id, context }).await? {
            Reply::ContextFreed => Ok(()),
            other => Err(unexpected_reply("FreeContext", &other)),
        }
    }

    /// Tokenize `text` and append the result to the context's token
    /// buffer. The first call on a fresh context prepends the BOS marker.
    pub async fn tokenize(
        &self,
        context: ContextHandle,
        text: impl Into<String>,
    ) -> Result<Tokenized, Error> {
        let text = text.into();
        match self
            .round_trip(move |id| Control::Tokenize { id, context, text })
            .await?
        {
            Reply::Tokenized(out) => Ok(out),
            other => Err(unexpected_reply("Tokenize", &other)),
        }
    }

    /// Truncate the context's token window to `new_len`. `None` is a
    /// no-op; growing the window is rejected.
    pub async fn edit(&self, context: ContextHandle, new_len: Option<usize>) -> Result<(), Error> {
        match self.round_trip(|id| Control::Edit { id, context, new_len }).await? {
            Reply::Edited => Ok(()),
            other => Err(unexpected_reply("Edit", &other)),
        }
    }

    /// Ingest the context's pending tokens. Resolves after the worker's
    /// handshake, yielding the running operation and its cancel handle.
    pub async fn ingest(
        &self,
        context: ContextHandle,
    ) -> Result<(IngestOp, CancelHandle), Error> {
        let mut route = self.open_route();
        self.controls
            .send(Control::Ingest { id: route.id, context })
            .map_err(|_| Error::ChannelClosed)?;
        match route.rx.recv().await.unwrap_or(Err(Error::ChannelClosed))? {
            Reply::Handshake(signal) => {
                let cancel = CancelHandle { signal, route: route.tx.clone() };
                Ok((IngestOp { route }, cancel))
            }
            other => Err(unexpected_reply("Ingest", &other)),
        }
    }

    /// Generate tokens through `chain` until EOS or a full context window.
    /// Resolves after the worker's handshake, yielding the token stream
    /// and its cancel handle.
    pub async fn generate(
        &self,
        context: ContextHandle,
        chain: SamplerChain,
    ) -> Result<(TokenStream, CancelHandle), Error> {
        let mut route = self.open_route();
        self.controls
            .send(Control::Generate { id: route.id, context, chain })
            .map_err(|_| Error::ChannelClosed)?;
        match route.rx.recv().await.unwrap_or(Err(Error::ChannelClosed))? {
            Reply::Handshake(signal) => {
                let cancel = CancelHandle { signal, route: route.tx.clone() };
                Ok((TokenStream { route, finish: None, done: false }, cancel))
            }
            other => Err(unexpected_reply("Generate", &other)),
        }
    }

    /// Stop the worker. Other clones of this client fail with
    /// [`Error::ChannelClosed`] afterwards.
    pub async fn shutdown(self) -> Result<(), Error> {
        match self.round_trip(|id| Control::Exit { id }).await? {
            Reply::ExitDone => Ok(()),
            other => Err(unexpected_reply("Exit", &other)),
        }
    }

    async fn round_trip(
        &self,
        build: impl FnOnce(RequestId) -> Control,
    ) -> Result<Reply, Error> {
        let mut route = self.open_route();
        self.controls.send(build(route.id)).map_err(|_| Error::ChannelClosed)?;
        route.rx.recv().await.unwrap_or(Err(Error::ChannelClosed))
    }

    fn open_route(&self) -> Route {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut routes = self.routes.lock().unwrap();
        let mut rng = rand::thread_rng();
        let id = loop {
            let candidate: RequestId = rng.gen_range(1..=RequestId::MAX);
            if !routes.contains_key(&candidate) {
                break candidate;
            }
        };
        routes.insert(id, tx.clone());
        drop(routes);
        Route {
            id,
            rx,
            tx,
            _guard: RouteGuard { id, routes: Arc::clone(&self.routes) },
        }
    }
}

/// A running ingest call.
pub struct IngestOp {
    route: Route,
}

impl IngestOp {
    /// Wait for the ingest to finish. [`Outcome::Cancelled`] reports a
    /// cancellation issued through the paired handle; errors are the
    /// call's terminal failure.
    pub async fn wait(mut self) -> Result<Outcome, Error> {
        loop {
            match self.route.rx.recv().await.unwrap_or(Err(Error::ChannelClosed))? {
                Reply::IngestDone => return Ok(Outcome::Completed),
                Reply::Cancelled => return Ok(Outcome::Cancelled),
                other => debug!(?other, "ignoring reply while awaiting ingest"),
            }
        }
    }
}

/// Lazy, non-restartable stream of generated tokens.
pub struct TokenStream {
    route: Route,
    finish: Option<FinishReason>,
    done: bool,
}

impl TokenStream {
    /// Next token, or `None` once the stream has ended. An error is
    /// terminal: the stream yields it once and then only `None`.
    pub async fn next(&mut self) -> Option<Result<Token, Error>> {
        if self.done {
            return None;
        }
        loop {
            match self.route.rx.recv().await {
                Some(Ok(Reply::Token(token))) => return Some(Ok(token)),
                Some(Ok(Reply::GenerateDone(reason))) => {
                    self.done = true;
                    self.finish = Some(reason);
                    return None;
                }
                Some(Ok(Reply::Cancelled)) => {
                    self.done = true;
                    return None;
                }
                Some(Ok(other)) => debug!(?other, "ignoring reply during generation"),
                Some(Err(err)) => {
                    self.done = true;
                    return Some(Err(err));
                }
                None => {
                    self.done = true;
                    return Some(Err(Error::ChannelClosed));
                }
            }
        }
    }

    /// Why generation stopped. `None` while running, after cancellation,
    /// or after an error.
    pub fn finish_reason(&self) -> Option<FinishReason> {
        self.finish
    }

    /// Drain the stream, concatenating the token texts.
    pub async fn collect_text(mut self) -> Result<String, Error> {
        let mut text = String::new();
        while let Some(token) = self.next().await {
            text.push_str(&token?.text);
        }
        Ok(text)
    }
}

async fn route_replies(mut replies: UnboundedReceiver<Envelope>, routes: RouteMap) {
    while let Some(envelope) = replies.recv().await {
        let target = routes.lock().unwrap().get(&envelope.id).cloned();
        match target {
            Some(tx) => {
                let _ = tx.send(envelope.body);
            }
            None => debug!(id = envelope.id, "reply for an unknown or finished request"),
        }
    }
}

fn unexpected_reply(call: &str, reply: &Reply) -> Error {
    debug!(?reply, call, "protocol violation");
    Error::StateViolation(format!("unexpected reply for {call}"))
}

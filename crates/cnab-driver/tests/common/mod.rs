//! Scripted in-memory engine for driver tests.

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use cnab_driver::{
    ArchiveReader, ConnectOptions, ContainerEngine, ContainerSpec, ContainerWait, EngineConnector,
    EngineError, HostSpec, OutputFrame, OutputStream, WaitStatus,
};
use std::collections::{BTreeMap, VecDeque};
use std::io::{Cursor, Read};
use std::sync::{Arc, Mutex};
use tokio::io::AsyncReadExt;

pub const CONTAINER_ID: &str = "c0ffee";

/// A call observed by the fake engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Pull(String),
    Create(String),
    CopyTo(String),
    Attach,
    Wait,
    Start,
    CopyFrom(String),
    Remove(String),
    Notice(String),
}

/// How the container stops.
#[derive(Debug, Clone)]
pub enum Exit {
    Status(WaitStatus),
    WaitError(String),
}

/// Script for one fake run.
pub struct Script {
    pub create: VecDeque<Result<String, EngineError>>,
    pub pull_error: Option<String>,
    pub copy_to_error: Option<String>,
    pub attach_error: Option<String>,
    pub start_error: Option<String>,
    pub remove_error: Option<String>,
    pub frames: Vec<OutputFrame>,
    pub exit: Exit,
    /// Raw tar bytes returned by copy-from; `None` fails the copy.
    pub outputs: Option<Vec<u8>>,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            create: VecDeque::from([Ok(CONTAINER_ID.to_string())]),
            pull_error: None,
            copy_to_error: None,
            attach_error: None,
            start_error: None,
            remove_error: None,
            frames: Vec::new(),
            exit: Exit::Status(WaitStatus::exited(0)),
            outputs: Some(tar_of(&[])),
        }
    }
}

/// Fake engine that records every call and plays back a [`Script`].
pub struct FakeEngine {
    script: Mutex<Script>,
    calls: Mutex<Vec<Call>>,
    staged: Mutex<BTreeMap<String, String>>,
    specs: Mutex<Vec<(ContainerSpec, HostSpec)>>,
}

impl FakeEngine {
    pub fn new(script: Script) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script),
            calls: Mutex::new(Vec::new()),
            staged: Mutex::new(BTreeMap::new()),
            specs: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls
            .lock()
            .expect("test calls mutex should not be poisoned")
            .clone()
    }

    pub fn count(&self, matches: impl Fn(&Call) -> bool) -> usize {
        self.calls().iter().filter(|c| matches(c)).count()
    }

    /// Files extracted from the staged archive, keyed by entry name.
    pub fn staged(&self) -> BTreeMap<String, String> {
        self.staged
            .lock()
            .expect("test staged mutex should not be poisoned")
            .clone()
    }

    pub fn specs(&self) -> Vec<(ContainerSpec, HostSpec)> {
        self.specs
            .lock()
            .expect("test specs mutex should not be poisoned")
            .clone()
    }

    fn record(&self, call: Call) {
        self.calls
            .lock()
            .expect("test calls mutex should not be poisoned")
            .push(call);
    }

    fn script(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script
            .lock()
            .expect("test script mutex should not be poisoned")
    }
}

fn api(message: &Option<String>) -> Result<(), EngineError> {
    match message {
        Some(m) => Err(EngineError::Api(m.clone())),
        None => Ok(()),
    }
}

#[async_trait]
impl ContainerEngine for FakeEngine {
    async fn pull_image(&self, image: &str) -> Result<(), EngineError> {
        self.record(Call::Pull(image.to_string()));
        api(&self.script().pull_error)
    }

    async fn create_container(
        &self,
        spec: &ContainerSpec,
        host: &HostSpec,
    ) -> Result<String, EngineError> {
        self.record(Call::Create(spec.image.clone()));
        self.specs
            .lock()
            .expect("test specs mutex should not be poisoned")
            .push((spec.clone(), host.clone()));
        self.script()
            .create
            .pop_front()
            .unwrap_or_else(|| Err(EngineError::Api("unscripted create".into())))
    }

    async fn copy_to_container(
        &self,
        _id: &str,
        path: &str,
        mut archive: ArchiveReader,
    ) -> Result<(), EngineError> {
        self.record(Call::CopyTo(path.to_string()));
        let error = self.script().copy_to_error.clone();
        if error.is_some() {
            return api(&error);
        }
        let mut bytes = Vec::new();
        archive.read_to_end(&mut bytes).await?;
        let mut tar = tar::Archive::new(Cursor::new(bytes));
        let mut staged = BTreeMap::new();
        for entry in tar.entries()? {
            let mut entry = entry?;
            let name = entry.path()?.to_string_lossy().into_owned();
            let mut content = String::new();
            entry.read_to_string(&mut content)?;
            staged.insert(name, content);
        }
        *self
            .staged
            .lock()
            .expect("test staged mutex should not be poisoned") = staged;
        Ok(())
    }

    async fn attach_container(&self, _id: &str) -> Result<OutputStream, EngineError> {
        self.record(Call::Attach);
        let script = self.script();
        api(&script.attach_error)?;
        let frames: Vec<Result<OutputFrame, EngineError>> =
            script.frames.iter().cloned().map(Ok).collect();
        Ok(Box::pin(futures::stream::iter(frames)))
    }

    fn wait_container(&self, _id: &str) -> ContainerWait {
        self.record(Call::Wait);
        let exit = self.script().exit.clone();
        Box::pin(async move {
            match exit {
                Exit::Status(status) => Ok(status),
                Exit::WaitError(message) => Err(EngineError::Api(message)),
            }
        })
    }

    async fn start_container(&self, _id: &str) -> Result<(), EngineError> {
        self.record(Call::Start);
        api(&self.script().start_error)
    }

    async fn copy_from_container(
        &self,
        _id: &str,
        path: &str,
    ) -> Result<ArchiveReader, EngineError> {
        self.record(Call::CopyFrom(path.to_string()));
        match self.script().outputs.clone() {
            Some(bytes) => Ok(Box::pin(Cursor::new(bytes))),
            None => Err(EngineError::NotFound(path.to_string())),
        }
    }

    async fn remove_container(&self, id: &str) -> Result<(), EngineError> {
        self.record(Call::Remove(id.to_string()));
        api(&self.script().remove_error)
    }

    async fn notice(&self, message: &str) {
        self.record(Call::Notice(message.to_string()));
    }
}

/// Connector handing out a shared [`FakeEngine`].
pub struct FakeConnector {
    pub engine: Arc<FakeEngine>,
    pub connects: Mutex<Vec<ConnectOptions>>,
}

impl FakeConnector {
    pub fn new(engine: Arc<FakeEngine>) -> Arc<Self> {
        Arc::new(Self {
            engine,
            connects: Mutex::new(Vec::new()),
        })
    }

    pub fn connects(&self) -> Vec<ConnectOptions> {
        self.connects
            .lock()
            .expect("test connects mutex should not be poisoned")
            .clone()
    }
}

#[async_trait]
impl EngineConnector for FakeConnector {
    async fn connect(
        &self,
        options: ConnectOptions,
    ) -> Result<Arc<dyn ContainerEngine>, EngineError> {
        self.connects
            .lock()
            .expect("test connects mutex should not be poisoned")
            .push(options);
        Ok(self.engine.clone())
    }
}

/// Build an outputs archive the way the engine returns it for
/// `/cnab/app/outputs`: names relative to `/cnab/app`.
pub fn tar_of(files: &[(&str, &str)]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    let mut dir = tar::Header::new_gnu();
    dir.set_entry_type(tar::EntryType::Directory);
    dir.set_mode(0o755);
    dir.set_size(0);
    builder
        .append_data(&mut dir, "outputs/", std::io::empty())
        .expect("append dir");
    for (name, content) in files {
        let mut header = tar::Header::new_gnu();
        header.set_mode(0o644);
        header.set_size(content.len() as u64);
        builder
            .append_data(&mut header, format!("outputs/{name}"), content.as_bytes())
            .expect("append file");
    }
    builder.into_inner().expect("finish tar")
}

pub fn stdout(text: &'static str) -> OutputFrame {
    OutputFrame::Stdout(Bytes::from_static(text.as_bytes()))
}

pub fn stderr(text: &'static str) -> OutputFrame {
    OutputFrame::Stderr(Bytes::from_static(text.as_bytes()))
}

/// In-memory writer whose contents can be inspected after the run.
#[derive(Clone, Default)]
pub struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl SharedBuf {
    pub fn contents(&self) -> String {
        let bytes = self
            .0
            .lock()
            .expect("test buffer mutex should not be poisoned")
            .clone();
        String::from_utf8(bytes).expect("utf-8 output")
    }
}

impl tokio::io::AsyncWrite for SharedBuf {
    fn poll_write(
        self: std::pin::Pin<&mut Self>,
        _cx: &mut std::task::Context<'_>,
        buf: &[u8],
    ) -> std::task::Poll<std::io::Result<usize>> {
        self.0
            .lock()
            .expect("test buffer mutex should not be poisoned")
            .extend_from_slice(buf);
        std::task::Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(
        self: std::pin::Pin<&mut Self>,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn poll_shutdown(
        self: std::pin::Pin<&mut Self>,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        std::task::Poll::Ready(Ok(()))
    }
}

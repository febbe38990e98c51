use exn::ResultExt;
use knewstuff_cache::Cache;
use knewstuff_config::{Config, Paths};
use knewstuff_feed::models::{Entry, PreviewKind, SearchRequest, SortMode};
use knewstuff_provider::ProviderHandle;
use knewstuff_provider::fetch::{FetcherHandle, default_fetcher};
use knewstuff_provider::ocs::OcsClientHandle;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, instrument};

use crate::error::{ErrorKind, Result};
use crate::event::{EngineEvent, Jobs};
use crate::installation::{FileInstallation, InstallationHandle};
use crate::task::EngineTask;

/// Events of one engine, in the order they were produced.
pub type EngineEvents = UnboundedReceiver<EngineEvent>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Uninitialized,
    /// Providers are being discovered or initialized.
    Initializing,
    /// Every discovered provider is initialized.
    Ready,
}

/// Point-in-time view of the engine, mostly useful in tests.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub state: EngineState,
    /// IDs of registered providers
    pub providers: Vec<String>,
    pub request: SearchRequest,
    pub current_page: Option<u32>,
    pub jobs: Jobs,
}

pub(crate) enum Command {
    RequestData { page: u32, page_size: u32 },
    RequestMoreData,
    ReloadEntries,
    SetCategoriesFilter(Vec<String>),
    SetSortMode(SortMode),
    SetSearchTerm(String),
    Install { entry: Entry, link_id: u32 },
    Uninstall(Entry),
    CheckForUpdates,
    CheckForInstalled,
    LoadDetails(Entry),
    LoadPreview { entry: Entry, kind: PreviewKind },
    Vote { entry: Entry, rating: u32 },
    BecomeFan(Entry),
    Snapshot(oneshot::Sender<Snapshot>),
    Close(oneshot::Sender<Result<()>>),
}

/// Collaborators and overrides for [`Engine::init`].
///
/// Anything left unset falls back to the system default: platform
/// directories, the `file`/`http(s)` fetcher, and a [`FileInstallation`]
/// into the configured install directory. Without an OCS client, only
/// static feed providers can be created.
#[derive(Default)]
pub struct EngineOptions {
    paths: Option<Paths>,
    fetcher: Option<FetcherHandle>,
    ocs_client: Option<OcsClientHandle>,
    installation: Option<InstallationHandle>,
    providers: Vec<ProviderHandle>,
    in_memory: bool,
}

impl EngineOptions {
    pub fn with_paths(mut self, paths: Paths) -> Self {
        self.paths = Some(paths);
        self
    }

    pub fn with_fetcher(mut self, fetcher: FetcherHandle) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn with_ocs_client(mut self, client: OcsClientHandle) -> Self {
        self.ocs_client = Some(client);
        self
    }

    pub fn with_installation(mut self, installation: InstallationHandle) -> Self {
        self.installation = Some(installation);
        self
    }

    /// Register a ready-made provider in addition to any discovered ones.
    pub fn with_provider(mut self, provider: ProviderHandle) -> Self {
        self.providers.push(provider);
        self
    }

    /// Keep the registry in memory instead of on disk.
    pub fn in_memory(mut self) -> Self {
        self.in_memory = true;
        self
    }
}

/// Handle to a running engine.
///
/// Every operation is a message to the engine task and returns immediately;
/// outcomes arrive as [`EngineEvent`]s. Dropping the handle stops the task
/// after a final registry write, but only [`Engine::close`] waits for it.
pub struct Engine {
    commands: UnboundedSender<Command>,
    task: JoinHandle<()>,
}

impl Engine {
    /// Load the named configuration, open the application's registry and
    /// start discovering providers.
    ///
    /// # Errors
    ///
    /// Fails if the configuration is missing or malformed, or if the registry
    /// cannot be opened. Provider problems are reported as events instead.
    #[instrument(skip(name, options), fields(name = %name.as_ref().display()))]
    pub async fn init(name: impl AsRef<Path>, options: EngineOptions) -> Result<(Self, EngineEvents)> {
        let paths = match &options.paths {
            Some(paths) => paths.clone(),
            None => Paths::from_system().or_raise(|| ErrorKind::Configuration)?,
        };
        let config = Config::load(name, &paths).or_raise(|| ErrorKind::Configuration)?;
        Self::with_config(config, options.with_paths(paths)).await
    }

    /// Start an engine for an already loaded configuration.
    #[instrument(skip_all, fields(app = %config.app))]
    pub async fn with_config(config: Config, options: EngineOptions) -> Result<(Self, EngineEvents)> {
        let EngineOptions { paths, fetcher, ocs_client, installation, providers, in_memory } = options;
        let paths = match paths {
            Some(paths) => paths,
            None => Paths::from_system().or_raise(|| ErrorKind::Configuration)?,
        };
        let fetcher = match fetcher {
            Some(fetcher) => fetcher,
            None => default_fetcher().or_raise(|| ErrorKind::Transport)?,
        };
        let installation: InstallationHandle = match installation {
            Some(installation) => installation,
            None => Arc::new(FileInstallation::new(config.install_dir(&paths), fetcher.clone())?),
        };

        let mut cache = if in_memory {
            Cache::in_memory(&config.app).await
        } else {
            Cache::open(&config.app, paths.registry_dir()).await
        }
        .or_raise(|| ErrorKind::Cache)?;
        cache.read_registry().await.or_raise(|| ErrorKind::Cache)?;

        let (commands, receiver) = mpsc::unbounded_channel();
        let (events_tx, events) = mpsc::unbounded_channel();
        let task = EngineTask::new(config, cache, fetcher, ocs_client, installation, providers, events_tx);
        let task = tokio::spawn(task.run(receiver));
        Ok((Self { commands, task }, events))
    }

    fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            debug!("engine task has stopped, command dropped");
        }
    }

    /// Ask every initialized provider for `page` of the current request.
    pub fn request_data(&self, page: u32, page_size: u32) {
        self.send(Command::RequestData { page, page_size });
    }

    /// Ask for the next page, once the current one has been answered.
    pub fn request_more_data(&self) {
        self.send(Command::RequestMoreData);
    }

    pub fn reload_entries(&self) {
        self.send(Command::ReloadEntries);
    }

    pub fn set_categories_filter(&self, categories: Vec<String>) {
        self.send(Command::SetCategoriesFilter(categories));
    }

    pub fn set_sort_mode(&self, sort_mode: SortMode) {
        self.send(Command::SetSortMode(sort_mode));
    }

    /// Searches are sent once the term has not changed for a second, or
    /// straight away when the results are already cached.
    pub fn set_search_term(&self, term: impl Into<String>) {
        self.send(Command::SetSearchTerm(term.into()));
    }

    pub fn install(&self, entry: Entry, link_id: u32) {
        self.send(Command::Install { entry, link_id });
    }

    pub fn uninstall(&self, entry: Entry) {
        self.send(Command::Uninstall(entry));
    }

    pub fn check_for_updates(&self) {
        self.send(Command::CheckForUpdates);
    }

    pub fn check_for_installed(&self) {
        self.send(Command::CheckForInstalled);
    }

    pub fn load_details(&self, entry: Entry) {
        self.send(Command::LoadDetails(entry));
    }

    pub fn load_preview(&self, entry: Entry, kind: PreviewKind) {
        self.send(Command::LoadPreview { entry, kind });
    }

    /// Rate an entry from 0 to 100.
    pub fn vote(&self, entry: Entry, rating: u32) {
        self.send(Command::Vote { entry, rating });
    }

    pub fn become_fan(&self, entry: Entry) {
        self.send(Command::BecomeFan(entry));
    }

    /// # Errors
    ///
    /// Fails with [`ErrorKind::Closed`] once the engine task has stopped.
    pub async fn snapshot(&self) -> Result<Snapshot> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Snapshot(tx));
        rx.await.or_raise(|| ErrorKind::Closed)
    }

    /// Wait for running installs, write the registry and stop the engine.
    pub async fn close(self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Close(tx));
        let result = rx.await.or_raise(|| ErrorKind::Closed)?;
        self.task.await.or_raise(|| ErrorKind::Closed)?;
        result
    }
}

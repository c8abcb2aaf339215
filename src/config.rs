use crate::{
    data_store::{DataStore, MemoryDataStore},
    events::{ExtensionRuntime, NoopRuntime},
    transport::{HttpTransport, Transport},
    TargetExtension,
};

/// Collaborators for [`TargetExtension`].
///
/// # Examples
/// ```no_run
/// # use mbox_prefetch::{ExtensionConfig, ExtensionRuntime, FileDataStore};
/// # fn test(runtime: impl ExtensionRuntime) -> mbox_prefetch::Result<()> {
/// let extension = ExtensionConfig::new(runtime)
///     .data_store(FileDataStore::open("target.json")?)
///     .to_extension();
/// # Ok(())
/// # }
/// ```
pub struct ExtensionConfig<'a> {
    pub(crate) runtime: Box<dyn ExtensionRuntime + 'a>,
    pub(crate) data_store: Box<dyn DataStore + Send + 'a>,
    pub(crate) transport: Box<dyn Transport + 'a>,
}

impl<'a> ExtensionConfig<'a> {
    /// Create a configuration talking to `runtime`, with an in-memory store and an HTTP transport.
    pub fn new(runtime: impl ExtensionRuntime + 'a) -> Self {
        ExtensionConfig {
            runtime: Box::new(runtime),
            data_store: Box::new(MemoryDataStore::new()),
            transport: Box::new(HttpTransport::new()),
        }
    }

    /// Talk to the host through `runtime`.
    pub fn runtime(mut self, runtime: impl ExtensionRuntime + 'a) -> Self {
        self.runtime = Box::new(runtime);
        self
    }

    /// Persist session and identity state in `data_store`.
    pub fn data_store(mut self, data_store: impl DataStore + Send + 'a) -> Self {
        self.data_store = Box::new(data_store);
        self
    }

    /// Send delivery calls through `transport`.
    pub fn transport(mut self, transport: impl Transport + 'a) -> Self {
        self.transport = Box::new(transport);
        self
    }

    /// Create a new [`TargetExtension`] using this configuration.
    pub fn to_extension(self) -> TargetExtension<'a> {
        TargetExtension::new(self)
    }
}

impl<'a> Default for ExtensionConfig<'a> {
    /// A configuration with a [`NoopRuntime`], for hosts that set the runtime later with
    /// [`ExtensionConfig::runtime`].
    fn default() -> Self {
        ExtensionConfig::new(NoopRuntime)
    }
}

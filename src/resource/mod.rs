//! # Resource Handle
//!
//! A `Resource` is the long-lived handle to one store on disk. It owns the
//! pieces shared by every transaction, the configuration and the buffer
//! manager, and hands out page-read transactions, each with its own reader
//! handle over the data file. Later-created transactions may observe later
//! revisions; each stays snapshot-consistent on its own.
//!
//! The buffer manager is injected into every transaction from here; it is
//! resource-scoped, never global.

use std::sync::Arc;

use eyre::{ensure, Result};

use crate::cache::{BufferManager, WriterPageLog};
use crate::config::ResourceConfig;
use crate::index::IndexController;
use crate::io::{FileReader, Reader};
use crate::page::Page;
use crate::trx::PageReadTrx;

pub struct Resource {
    config: Arc<ResourceConfig>,
    buffer_manager: Arc<BufferManager>,
    uber_page: Arc<Page>,
}

impl Resource {
    /// Opens the resource rooted at `config.path()` and loads its current
    /// uber page.
    pub fn open(config: ResourceConfig) -> Result<Self> {
        let data_file = config.data_file();
        ensure!(
            data_file.exists(),
            "resource data file '{}' does not exist",
            data_file.display()
        );

        let mut reader = FileReader::open(&data_file)?;
        let uber_reference = reader.read_uber_page_reference()?;
        let uber_page = Arc::new(reader.read(uber_reference.key())?);
        uber_page.as_uber()?;
        reader.close()?;

        Ok(Self {
            config: Arc::new(config),
            buffer_manager: Arc::new(BufferManager::new()),
            uber_page,
        })
    }

    /// Newest stored revision.
    pub fn most_recent_revision(&self) -> Result<u32> {
        let count = self.uber_page.as_uber()?.revision_count();
        ensure!(count > 0, "store has no revisions yet");
        Ok(count - 1)
    }

    /// Begins a read-only transaction bound to `revision`.
    pub fn begin_read_trx(&self, revision: u32) -> Result<PageReadTrx> {
        self.begin(revision, None, None)
    }

    /// Begins a read-only transaction that consults a sibling writer's
    /// in-memory page log before anything durable.
    pub fn begin_read_trx_with_writer(
        &self,
        revision: u32,
        writer_log: Arc<WriterPageLog>,
    ) -> Result<PageReadTrx> {
        self.begin(revision, Some(writer_log), None)
    }

    /// Begins a read-only transaction with pre-loaded index definitions,
    /// skipping the per-revision definitions file.
    pub fn begin_read_trx_with_index_controller(
        &self,
        revision: u32,
        index_controller: IndexController,
    ) -> Result<PageReadTrx> {
        self.begin(revision, None, Some(index_controller))
    }

    /// Begins a read-only transaction over a caller-supplied reader handle
    /// instead of a fresh mmap over the data file.
    pub fn begin_read_trx_with_reader(
        &self,
        revision: u32,
        reader: Box<dyn Reader>,
    ) -> Result<PageReadTrx> {
        PageReadTrx::new(
            Arc::clone(&self.config),
            Arc::clone(&self.uber_page),
            revision,
            reader,
            None,
            None,
            Arc::clone(&self.buffer_manager),
        )
    }

    fn begin(
        &self,
        revision: u32,
        writer_log: Option<Arc<WriterPageLog>>,
        index_controller: Option<IndexController>,
    ) -> Result<PageReadTrx> {
        let reader = FileReader::open(self.config.data_file())?;
        PageReadTrx::new(
            Arc::clone(&self.config),
            Arc::clone(&self.uber_page),
            revision,
            Box::new(reader),
            writer_log,
            index_controller,
            Arc::clone(&self.buffer_manager),
        )
    }

    pub fn config(&self) -> &ResourceConfig {
        &self.config
    }

    pub fn buffer_manager(&self) -> &Arc<BufferManager> {
        &self.buffer_manager
    }

    pub fn uber_page(&self) -> &Arc<Page> {
        &self.uber_page
    }
}

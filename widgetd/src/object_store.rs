//! CLI handling for object store config (via CLI arguments and environment
//! variables).

use anyhow::Context;
use object_store::{aws::AmazonS3Builder, local::LocalFileSystem, memory::InMemory, ObjectStore};
use std::{path::PathBuf, sync::Arc};

/// Which backend hosts the source and destination containers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub(crate) enum ObjectStoreType {
    /// In-memory store, for local smoke testing; contents are lost on exit
    Memory,
    /// Local filesystem, one directory per container under `--data-dir`
    File,
    /// Amazon S3, credentials and region taken from the environment
    S3,
}

#[derive(Debug, clap::Parser)]
pub(crate) struct ObjectStoreConfig {
    /// Backend hosting the source and destination containers
    #[clap(
        long = "object-store",
        env = "WIDGETD_OBJECT_STORE",
        value_enum,
        default_value = "s3",
        action
    )]
    pub(crate) object_store: ObjectStoreType,

    /// Root directory for `file` object stores; each container becomes a
    /// subdirectory
    #[clap(long = "data-dir", env = "WIDGETD_DATA_DIR", action)]
    pub(crate) data_dir: Option<PathBuf>,
}

impl ObjectStoreConfig {
    /// Build a store rooted at the named container.
    pub(crate) fn make_store(&self, container: &str) -> Result<Arc<dyn ObjectStore>, anyhow::Error> {
        match self.object_store {
            ObjectStoreType::Memory => Ok(Arc::new(InMemory::new())),
            ObjectStoreType::File => {
                let data_dir = self
                    .data_dir
                    .as_ref()
                    .context("--data-dir is required with --object-store file")?;
                let root = data_dir.join(container);
                std::fs::create_dir_all(&root)
                    .with_context(|| format!("cannot create container directory {root:?}"))?;
                let store = LocalFileSystem::new_with_prefix(&root)
                    .with_context(|| format!("cannot open container directory {root:?}"))?;
                Ok(Arc::new(store))
            }
            ObjectStoreType::S3 => {
                let store = AmazonS3Builder::from_env()
                    .with_bucket_name(container)
                    .build()
                    .context("invalid S3 configuration")?;
                Ok(Arc::new(store))
            }
        }
    }
}

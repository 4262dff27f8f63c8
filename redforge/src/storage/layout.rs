//! Storage layout configuration

use std::path::{Path, PathBuf};

use crate::errors::ForgeError;
use crate::filesys::dir::Dir;
use crate::filesys::file::File;

/// Root of every deployment working directory
#[derive(Debug, Clone)]
pub struct WorkspaceLayout {
    /// Base directory for all deployments
    pub base_dir: PathBuf,
}

impl WorkspaceLayout {
    /// Create a new workspace layout
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Working directory of one deployment
    pub fn deployment(&self, deployment_id: &str) -> DeploymentDir {
        DeploymentDir {
            root: Dir::new(self.base_dir.join(deployment_id)),
        }
    }

    /// Create the base directory
    pub async fn setup(&self) -> Result<(), ForgeError> {
        Dir::new(&self.base_dir).create().await
    }
}

impl Default for WorkspaceLayout {
    fn default() -> Self {
        Self::new("/var/lib/redforge/deployments")
    }
}

/// `<root>/<deploymentId>/{terraform,ansible,files}` plus the private key
#[derive(Debug, Clone)]
pub struct DeploymentDir {
    root: Dir,
}

impl DeploymentDir {
    pub fn path(&self) -> &Path {
        self.root.path()
    }

    pub fn root(&self) -> &Dir {
        &self.root
    }

    /// Terraform working directory
    pub fn terraform_dir(&self) -> Dir {
        self.root.subdir("terraform")
    }

    /// Ansible working directory
    pub fn ansible_dir(&self) -> Dir {
        self.root.subdir("ansible")
    }

    /// Rendered `file` variables
    pub fn files_dir(&self) -> Dir {
        self.root.subdir("files")
    }

    /// Private key shared by terraform and ansible
    pub fn private_key_file(&self) -> File {
        self.root.file("private-key.pem")
    }

    /// Provider state artifact written by terraform apply
    pub fn state_file(&self) -> File {
        self.terraform_dir().file("terraform.tfstate")
    }

    /// Compiled code of one infrastructure
    pub fn infrastructure_file(&self, infrastructure_id: &str) -> File {
        self.terraform_dir()
            .file(&format!("{}.tf", infrastructure_id))
    }

    pub fn inventory_file(&self) -> File {
        self.ansible_dir().file("inventory.yml")
    }

    /// Ordered playbook manifest
    pub fn manifest_file(&self) -> File {
        self.ansible_dir().file("main.yml")
    }

    pub fn playbook_file(&self, configuration_id: &str) -> File {
        self.ansible_dir()
            .file(&format!("{}.yml", configuration_id))
    }

    /// Create the working directory tree
    pub async fn scaffold(&self) -> Result<(), ForgeError> {
        self.terraform_dir().create().await?;
        self.ansible_dir().create().await?;
        self.files_dir().create().await?;
        Ok(())
    }
}

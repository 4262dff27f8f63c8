//! Configuration pass: inventory, playbooks and the playbook run over the mesh

use secrecy::ExposeSecret;
use serde_yaml::{Mapping, Value};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::deploy::credentials::{mesh_api_key, ToolEnv};
use crate::deploy::executor::{Executor, RunContext, ToolInvocation};
use crate::deploy::mesh::{control_hostname, host_hostname, MeshKeyIssuer};
use crate::deploy::variables::{substitute, VariableResolver};
use crate::errors::ForgeError;
use crate::models::catalog::{setting_names, Integration, TemplateKind};
use crate::models::deployment::Deployment;
use crate::models::infrastructure::Infrastructure;
use crate::storage::layout::DeploymentDir;
use crate::store::Store;

/// Inventory group every host belongs to
pub const INVENTORY_GROUP: &str = "forge";

/// One inventory entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryHost {
    pub alias: String,
    pub address: String,
    pub user: Option<String>,
}

/// `forge: hosts: {alias: {ansible_host, ansible_user}}` in host order
pub fn render_inventory(hosts: &[InventoryHost]) -> Result<String, ForgeError> {
    let mut entries = Mapping::new();
    for host in hosts {
        let mut vars = Mapping::new();
        vars.insert("ansible_host".into(), host.address.clone().into());
        if let Some(user) = &host.user {
            vars.insert("ansible_user".into(), user.clone().into());
        }
        entries.insert(host.alias.clone().into(), Value::Mapping(vars));
    }

    let mut group = Mapping::new();
    group.insert("hosts".into(), Value::Mapping(entries));
    let mut root = Mapping::new();
    root.insert(INVENTORY_GROUP.into(), Value::Mapping(group));

    Ok(serde_yaml::to_string(&root)?)
}

/// Bind every play of `playbook` to `alias`
pub fn bind_hosts(playbook: &str, alias: &str) -> Result<String, ForgeError> {
    let mut document: Value = serde_yaml::from_str(playbook)?;
    let plays = document
        .as_sequence_mut()
        .ok_or_else(|| ForgeError::TemplateError("Playbook must be a list of plays".to_string()))?;

    for play in plays.iter_mut() {
        let play = play
            .as_mapping_mut()
            .ok_or_else(|| ForgeError::TemplateError("Play must be a mapping".to_string()))?;
        play.insert("hosts".into(), alias.into());
    }

    Ok(serde_yaml::to_string(&document)?)
}

/// Ordered `import_playbook` manifest for `configuration_ids`
pub fn render_manifest(configuration_ids: &[String]) -> Result<String, ForgeError> {
    let entries: Vec<Value> = configuration_ids
        .iter()
        .map(|id| {
            let mut entry = Mapping::new();
            entry.insert("name".into(), id.clone().into());
            entry.insert("import_playbook".into(), format!("{}.yml", id).into());
            Value::Mapping(entry)
        })
        .collect();
    Ok(serde_yaml::to_string(&entries)?)
}

/// Runs the configuration pass of one deployment
pub struct Configurator<'a> {
    pub store: &'a Store,
    pub executor: &'a Executor,
    pub issuer: &'a dyn MeshKeyIssuer,
    pub ctx: &'a RunContext,
    pub deployment: &'a Deployment,
    pub dir: &'a DeploymentDir,
    pub tailscale: &'a Integration,
}

impl Configurator<'_> {
    /// Render every playbook and the manifest, returning the targeted
    /// infrastructure
    async fn write_playbooks(&self) -> Result<Vec<Infrastructure>, ForgeError> {
        let (targets, templates) = self
            .store
            .read(|t| {
                let targets: Vec<Infrastructure> = t
                    .infrastructure_of(&self.deployment.id)
                    .into_iter()
                    .filter(|i| !i.configurations.is_empty())
                    .collect();
                let templates = t.templates.filter(|tpl| tpl.kind == TemplateKind::Configuration);
                (targets, templates)
            })
            .await;

        let mut manifest = Vec::new();
        for infra in &targets {
            let resolver = VariableResolver::new(self.store, self.dir.files_dir(), &infra.id);
            for configuration in &infra.configurations {
                let Some(template) = templates.iter().find(|t| t.id == configuration.template) else {
                    warn!(
                        "Configuration template {} not found, skipping {}",
                        configuration.template, configuration.id
                    );
                    continue;
                };

                let bindings = resolver.resolve(&configuration.variables).await?;
                let playbook = bind_hosts(&substitute(&template.value, &bindings), &infra.host_alias())?;
                self.dir
                    .playbook_file(&configuration.id)
                    .write_string(&playbook)
                    .await?;
                manifest.push(configuration.id.clone());
            }
        }

        self.dir
            .manifest_file()
            .write_string(&render_manifest(&manifest)?)
            .await?;
        Ok(targets)
    }

    /// Mesh address of an infrastructure, resolving and persisting it when
    /// not yet known
    async fn host_address(&self, infra: &Infrastructure) -> Result<String, ForgeError> {
        let resources = self.store.read(|t| t.resources_of(&infra.id)).await;
        if let Some(address) = resources.iter().find_map(|r| r.tailscale_ip.clone()) {
            return Ok(address);
        }

        let host = resources.iter().find(|r| r.is_host()).ok_or_else(|| {
            ForgeError::ConfigError(format!("Infrastructure {} has no host to configure", infra.name))
        })?;
        let output = self
            .executor
            .run(
                self.ctx,
                ToolInvocation::new("tailscale")
                    .args(["ip", "-4"])
                    .arg(host_hostname(&infra.name, &host.id)),
            )
            .await?;
        let address = output
            .stdout
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .ok_or_else(|| {
                ForgeError::ConfigError(format!("No mesh address for infrastructure {}", infra.name))
            })?
            .to_string();

        let host_id = host.id.clone();
        let persisted = address.clone();
        self.store
            .write(move |t| {
                t.resources
                    .update(&host_id, |r| r.tailscale_ip = Some(persisted));
            })
            .await?;
        Ok(address)
    }

    async fn enrol(&self) -> Result<(), ForgeError> {
        let tag = self
            .store
            .read(|t| t.setting(setting_names::TAILSCALE_TAG).map(str::to_string))
            .await;
        let api_key = mesh_api_key(self.tailscale)?;
        let key = self.issuer.create_device_key(&api_key, tag.as_deref()).await?;

        self.logout(self.ctx).await?;
        self.executor
            .run(
                self.ctx,
                ToolInvocation::new("tailscale")
                    .arg("up")
                    .arg(format!("--auth-key={}", key.expose_secret()))
                    .arg("--accept-dns=false")
                    .arg(format!(
                        "--hostname={}",
                        control_hostname(self.deployment.short_id())
                    )),
            )
            .await?;
        Ok(())
    }

    async fn logout(&self, ctx: &RunContext) -> Result<(), ForgeError> {
        match self
            .executor
            .run(ctx, ToolInvocation::new("tailscale").arg("logout"))
            .await
        {
            Ok(_) => Ok(()),
            Err(ForgeError::Cancelled) => Err(ForgeError::Cancelled),
            Err(e) => {
                warn!("Mesh logout failed: {}", e);
                Ok(())
            }
        }
    }

    async fn configure(&self) -> Result<Vec<Infrastructure>, ForgeError> {
        let targets = self.write_playbooks().await?;
        self.enrol().await?;

        let mut hosts = Vec::with_capacity(targets.len());
        for infra in &targets {
            hosts.push(InventoryHost {
                alias: infra.host_alias(),
                address: self.host_address(infra).await?,
                user: infra.username.clone(),
            });
        }
        self.dir
            .inventory_file()
            .write_string(&render_inventory(&hosts)?)
            .await?;

        let verbose = self
            .store
            .read(|t| t.setting(setting_names::ANSIBLE_OUTPUT) == Some("verbose"))
            .await;
        let mut playbook = ToolInvocation::new("ansible-playbook")
            .args([
                "-i",
                "inventory.yml",
                "--private-key=../private-key.pem",
                "main.yml",
            ])
            .env(ToolEnv::new().with("ANSIBLE_HOST_KEY_CHECKING", "False"))
            .extend_path("/root/.local/bin")
            .cwd(self.dir.ansible_dir().path());
        if verbose {
            playbook = playbook.arg("-vvv");
        }
        self.executor.run(self.ctx, playbook).await?;

        info!("Configured deployment {}", self.deployment.id);
        Ok(targets)
    }

    /// Run the whole pass, always leaving the mesh afterwards.
    ///
    /// Returns the infrastructure whose configurations were applied.
    pub async fn run(&self) -> Result<Vec<Infrastructure>, ForgeError> {
        let result = self.configure().await;

        let cleanup = RunContext {
            cancel: CancellationToken::new(),
            ..self.ctx.clone()
        };
        if let Err(e) = self.logout(&cleanup).await {
            warn!("Mesh logout failed: {}", e);
        }
        result
    }
}

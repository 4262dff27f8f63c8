//! Template variable resolution

use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::debug;

use crate::errors::ForgeError;
use crate::filesys::dir::Dir;
use crate::models::infrastructure::{Variable, VariableKind};
use crate::store::Store;

/// A placeholder name and the text substituted for it
pub type Binding = (String, String);

/// Placeholder form of a variable name
pub fn placeholder(name: &str) -> String {
    format!("$${}$$", name)
}

/// Replace every `$$NAME$$` of `bindings` in `text`
pub fn substitute(text: &str, bindings: &[Binding]) -> String {
    bindings
        .iter()
        .fold(text.to_string(), |acc, (name, value)| {
            acc.replace(&placeholder(name), value)
        })
}

/// Resolves variables for one infrastructure
pub struct VariableResolver<'a> {
    store: &'a Store,
    files_dir: Dir,
    infrastructure_id: &'a str,
}

impl<'a> VariableResolver<'a> {
    pub fn new(store: &'a Store, files_dir: Dir, infrastructure_id: &'a str) -> Self {
        Self {
            store,
            files_dir,
            infrastructure_id,
        }
    }

    /// Resolve `variables` into bindings, rendering `file` variables to disk
    pub async fn resolve(&self, variables: &[Variable]) -> Result<Vec<Binding>, ForgeError> {
        let mut bindings = Vec::with_capacity(variables.len());
        for variable in variables {
            if variable.name.is_empty() {
                continue;
            }
            let value = self.resolve_one(variable).await?;
            bindings.push((variable.name.clone(), value));
        }
        Ok(bindings)
    }

    fn resolve_one<'b>(&'b self, variable: &'b Variable) -> BoxFuture<'b, Result<String, ForgeError>> {
        async move {
            match variable.kind {
                VariableKind::Literal | VariableKind::Domain => Ok(variable.value.clone()),
                VariableKind::InfrastructureId => Ok(self.infrastructure_id.to_string()),
                VariableKind::File => self.render_file(variable).await,
            }
        }
        .boxed()
    }

    async fn render_file(&self, variable: &Variable) -> Result<String, ForgeError> {
        let stored = self
            .store
            .read(|t| t.files.get(&variable.value).cloned())
            .await
            .ok_or_else(|| ForgeError::NotFound(format!("File {} not found", variable.value)))?;

        let mut nested = Vec::with_capacity(variable.variables.len());
        for inner in &variable.variables {
            if inner.name.is_empty() {
                continue;
            }
            nested.push((inner.name.clone(), self.resolve_one(inner).await?));
        }

        let file = self.files_dir.file(&stored.rendered_name());
        file.write_string(&substitute(&stored.value, &nested)).await?;
        debug!("Rendered file variable {} to {:?}", variable.name, file.path());

        Ok(file.path().to_string_lossy().into_owned())
    }
}

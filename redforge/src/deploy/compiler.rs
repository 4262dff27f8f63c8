//! Infrastructure template compiler
//!
//! Turns an infrastructure template into the code written to
//! `terraform/<infrastructureId>.tf`. Each `resource` block is extracted with a
//! balanced-brace scanner, has its variables substituted and its name made
//! unique, and compute hosts get a key pair reference plus a bootstrap script
//! joining them to the mesh. References to renamed blocks are re-pointed once
//! all blocks are compiled.

use std::sync::LazyLock;

use futures::future::join_all;
use regex::Regex;
use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

use crate::deploy::mesh::{bootstrap_script, host_hostname, MeshKeyIssuer};
use crate::deploy::variables::{substitute, Binding};
use crate::errors::ForgeError;
use crate::models::infrastructure::{is_host_type, Resource};
use crate::utils::generate_uuid;

static RESOURCE_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"resource\s+"([^"]+)"\s+"([^"]+)"\s*\{"#).expect("valid resource header regex")
});

static STRAY_RESOURCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*resource\b").expect("valid stray resource regex"));

/// A top-level `resource` block of a template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub resource_type: String,
    pub name: String,
    /// Full text from `resource` to the matching closing brace
    pub text: String,
}

impl Block {
    /// `type.name` reference form
    pub fn reference(&self) -> String {
        format!("{}.{}", self.resource_type, self.name)
    }
}

/// Index one past the brace closing the block opened at `open`
fn matching_brace(source: &str, open: usize) -> Option<usize> {
    let bytes = source.as_bytes();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    let mut in_comment = false;
    let mut block_comment_end = None;

    for (i, &b) in bytes.iter().enumerate().skip(open) {
        if let Some(end) = block_comment_end {
            if i > end && b == b'/' && bytes[i - 1] == b'*' {
                block_comment_end = None;
            }
            continue;
        }
        if in_comment {
            if b == b'\n' {
                in_comment = false;
            }
            continue;
        }
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'#' => in_comment = true,
            b'/' if bytes.get(i + 1) == Some(&b'/') => in_comment = true,
            // `/*/` does not close itself
            b'/' if bytes.get(i + 1) == Some(&b'*') => block_comment_end = Some(i + 2),
            b'{' => depth += 1,
            b'}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }
    None
}

fn check_gap(gap: &str) -> Result<(), ForgeError> {
    if let Some(stray) = STRAY_RESOURCE.find(gap) {
        let line = gap[stray.start()..].lines().next().unwrap_or_default().trim();
        return Err(ForgeError::TemplateError(format!(
            "Unparseable resource header: '{}'",
            line
        )));
    }
    Ok(())
}

/// Extract every top-level `resource` block in source order.
///
/// Nested blocks stay inside their parent. Fails on a `resource` line that
/// has no parseable header or on an unterminated block.
pub fn extract_blocks(source: &str) -> Result<Vec<Block>, ForgeError> {
    let mut blocks = Vec::new();
    let mut pos = 0;

    while let Some(caps) = RESOURCE_HEADER.captures_at(source, pos) {
        let Some(header) = caps.get(0) else {
            break;
        };
        check_gap(&source[pos..header.start()])?;

        let open = header.end() - 1;
        let end = matching_brace(source, open).ok_or_else(|| {
            ForgeError::TemplateError(format!(
                "Unterminated resource block \"{}\" \"{}\"",
                &caps[1], &caps[2]
            ))
        })?;

        blocks.push(Block {
            resource_type: caps[1].to_string(),
            name: caps[2].to_string(),
            text: source[header.start()..end].to_string(),
        });
        pos = end;
    }
    check_gap(&source[pos..])?;

    Ok(blocks)
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'-'
}

/// Replace every `from` reference in `code` with `to`, skipping matches that
/// are part of a longer identifier
pub fn replace_reference(code: &str, from: &str, to: &str) -> String {
    let bytes = code.as_bytes();
    let mut out = String::with_capacity(code.len());
    let mut last = 0;

    for (start, _) in code.match_indices(from) {
        if start < last {
            continue;
        }
        let end = start + from.len();
        let before_ok = start == 0 || {
            let b = bytes[start - 1];
            !is_ident_byte(b) && b != b'.'
        };
        let after_ok = end == bytes.len() || !is_ident_byte(bytes[end]);
        if before_ok && after_ok {
            out.push_str(&code[last..start]);
            out.push_str(to);
            last = end;
        }
    }
    out.push_str(&code[last..]);
    out
}

/// Insert `lines` before the closing brace of a block
fn inject(block: &str, lines: &str) -> String {
    let Some(close) = block.rfind('}') else {
        return block.to_string();
    };
    let mut out = block[..close].to_string();
    if !out.ends_with('\n') {
        out.push('\n');
    }
    out.push_str(lines);
    out.push_str(&block[close..]);
    out
}

/// What host blocks need beyond variable substitution
pub struct HostProvisioning<'a> {
    /// Deployment region, pinned on droplets
    pub region: &'a str,
    pub issuer: &'a dyn MeshKeyIssuer,
    pub api_key: &'a SecretString,
    /// `tailscaleTag` setting
    pub tag: Option<&'a str>,
    /// `userData` setting
    pub user_data: Option<&'a str>,
}

/// Code and pending resource rows for one infrastructure
#[derive(Debug, Clone)]
pub struct CompiledInfrastructure {
    pub code: String,
    pub resources: Vec<Resource>,
}

struct CompiledBlock {
    text: String,
    resource: Resource,
    old_reference: String,
    new_reference: String,
}

async fn compile_block(
    block: &Block,
    infrastructure_id: &str,
    infrastructure_name: &str,
    bindings: &[Binding],
    hosts: &HostProvisioning<'_>,
) -> Result<CompiledBlock, ForgeError> {
    // Header is read after substitution: names and types may be templated
    let substituted = substitute(&block.text, bindings);
    let caps = RESOURCE_HEADER.captures(&substituted).ok_or_else(|| {
        ForgeError::TemplateError(format!(
            "Unparseable resource header after substitution in {}",
            block.reference()
        ))
    })?;
    let resource_type = caps[1].to_string();
    let name = caps[2].to_string();

    let id = generate_uuid();
    let new_name = format!("{}_{}", name, id);
    let header = format!("resource \"{}\" \"{}\" {{", resource_type, new_name);
    let mut text = RESOURCE_HEADER
        .replacen(&substituted, 1, regex::NoExpand(&header))
        .into_owned();

    if is_host_type(&resource_type) {
        let mut lines = match resource_type.as_str() {
            "aws_instance" => "  key_name = aws_key_pair.key_pair.key_name\n".to_string(),
            _ => format!(
                "  ssh_keys = [digitalocean_ssh_key.key_pair.id]\n  region = \"{}\"\n",
                hosts.region
            ),
        };

        let key = hosts.issuer.create_device_key(hosts.api_key, hosts.tag).await?;
        let script = bootstrap_script(
            key.expose_secret(),
            &host_hostname(infrastructure_name, &id),
            hosts.user_data,
        );
        lines.push_str(&format!("  user_data = <<-EOF\n{}EOF\n", script));
        text = inject(&text, &lines);
    }

    let old_reference = format!("{}.{}", resource_type, name);
    debug!("Compiled {} as {}", old_reference, new_name);
    Ok(CompiledBlock {
        text,
        resource: Resource::pending(&id, infrastructure_id, &resource_type, &new_name),
        new_reference: format!("{}.{}", resource_type, new_name),
        old_reference,
    })
}

/// Compile `source` for one infrastructure
pub async fn compile_infrastructure(
    source: &str,
    infrastructure_id: &str,
    infrastructure_name: &str,
    bindings: &[Binding],
    hosts: &HostProvisioning<'_>,
) -> Result<CompiledInfrastructure, ForgeError> {
    let blocks = extract_blocks(source)?;

    let compiled = join_all(blocks.iter().map(|block| {
        compile_block(block, infrastructure_id, infrastructure_name, bindings, hosts)
    }))
    .await
    .into_iter()
    .collect::<Result<Vec<_>, _>>()?;

    let mut code = compiled
        .iter()
        .map(|c| c.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");
    code.push('\n');

    for block in &compiled {
        code = replace_reference(&code, &block.old_reference, &block.new_reference);
    }

    Ok(CompiledInfrastructure {
        code,
        resources: compiled.into_iter().map(|c| c.resource).collect(),
    })
}

//! Provider baseline: network and key pair applied at prepare time

use crate::deploy::executor::{Executor, RunContext, ToolInvocation};
use crate::errors::ForgeError;
use crate::models::catalog::Platform;
use crate::storage::layout::DeploymentDir;

/// Name of the baseline infrastructure record
pub const BASELINE_NAME: &str = "Forge - Default Infrastructure";

pub const BASELINE_DESCRIPTION: &str =
    "The default deployment network and key pair created by redforge.";

/// `main.tf`, `network.tf` and `key.tf` for one deployment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaselineFiles {
    pub main: String,
    pub network: String,
    pub key: String,
}

/// Render the baseline code for `platform`
pub fn render(
    platform: Platform,
    deployment_id: &str,
    region: &str,
    key_name: &str,
    public_key: &str,
) -> Result<BaselineFiles, ForgeError> {
    let short_id = deployment_id.split('-').next().unwrap_or(deployment_id);
    match platform {
        Platform::Aws => Ok(BaselineFiles {
            main: aws_main(region),
            network: aws_network(short_id),
            key: format!(
                "resource \"aws_key_pair\" \"key_pair\" {{\n  key_name   = \"{}-{}\"\n  public_key = \"{}\"\n}}\n",
                key_name, short_id, public_key
            ),
        }),
        Platform::DigitalOcean => Ok(BaselineFiles {
            main: DIGITALOCEAN_MAIN.to_string(),
            network: format!(
                "resource \"digitalocean_vpc\" \"vpc\" {{\n  name     = \"forge-{}\"\n  region   = \"{}\"\n  ip_range = \"10.10.0.0/16\"\n}}\n",
                short_id, region
            ),
            key: format!(
                "resource \"digitalocean_ssh_key\" \"key_pair\" {{\n  name       = \"{}-{}\"\n  public_key = \"{}\"\n}}\n",
                key_name, short_id, public_key
            ),
        }),
        Platform::Tailscale => Err(ForgeError::ValidationError(
            "Tailscale is not a provisioning platform".to_string(),
        )),
    }
}

fn aws_main(region: &str) -> String {
    format!(
        r#"terraform {{
  required_providers {{
    aws = {{
      source = "hashicorp/aws"
    }}
  }}
}}

provider "aws" {{
  region = "{}"
}}
"#,
        region
    )
}

fn aws_network(short_id: &str) -> String {
    format!(
        r#"resource "aws_vpc" "vpc" {{
  cidr_block           = "10.0.0.0/16"
  enable_dns_hostnames = true

  tags = {{
    Name = "forge-{id}"
  }}
}}

resource "aws_subnet" "subnet" {{
  vpc_id                  = aws_vpc.vpc.id
  cidr_block              = "10.0.1.0/24"
  map_public_ip_on_launch = true

  tags = {{
    Name = "forge-{id}"
  }}
}}

resource "aws_internet_gateway" "gateway" {{
  vpc_id = aws_vpc.vpc.id
}}

resource "aws_route_table" "route_table" {{
  vpc_id = aws_vpc.vpc.id

  route {{
    cidr_block = "0.0.0.0/0"
    gateway_id = aws_internet_gateway.gateway.id
  }}
}}

resource "aws_route_table_association" "association" {{
  subnet_id      = aws_subnet.subnet.id
  route_table_id = aws_route_table.route_table.id
}}
"#,
        id = short_id
    )
}

const DIGITALOCEAN_MAIN: &str = r#"terraform {
  required_providers {
    digitalocean = {
      source = "digitalocean/digitalocean"
    }
  }
}

provider "digitalocean" {}
"#;

/// The key in OpenSSH form, converting PEM keys with `ssh-keygen`
pub async fn openssh_public_key(
    executor: &Executor,
    ctx: &RunContext,
    dir: &DeploymentDir,
    public_key: &str,
) -> Result<String, ForgeError> {
    let trimmed = public_key.trim();
    if trimmed.starts_with("ssh-") || trimmed.starts_with("ecdsa-") {
        return Ok(trimmed.to_string());
    }

    let pem = dir.root().file("public-key.pem");
    pem.write_string(trimmed).await?;
    let output = executor
        .run(
            ctx,
            ToolInvocation::new("ssh-keygen")
                .args(["-i", "-m", "PKCS8", "-f", "public-key.pem"])
                .cwd(dir.path()),
        )
        .await?;
    pem.delete().await?;

    let converted = output.stdout.trim().to_string();
    if converted.is_empty() {
        return Err(ForgeError::ValidationError(
            "Public key could not be converted to OpenSSH format".to_string(),
        ));
    }
    Ok(converted)
}

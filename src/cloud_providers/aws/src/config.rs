use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_credential_types::provider::ProvideCredentials;
use config::{Value, ValueKind};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// How AWS credentials are obtained for the `s3://` backend.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AwsConfig {
    Profile(String),
    RoleArn(String),
    #[default]
    Env,
}

impl From<AwsConfig> for ValueKind {
    fn from(value: AwsConfig) -> Self {
        match value {
            AwsConfig::Profile(profile) => {
                let mut table = HashMap::new();
                table.insert("profile".to_string(), Value::new(None, Self::String(profile)));
                Self::Table(table)
            }
            AwsConfig::RoleArn(role) => {
                let mut table = HashMap::new();
                table.insert("role_arn".to_string(), Value::new(None, Self::String(role)));
                Self::Table(table)
            }
            AwsConfig::Env => Self::String("env".to_string()),
        }
    }
}

pub async fn get_initialized_aws_conf(
    initialization_conf: AwsConfig,
    region: Option<&str>,
) -> Option<SdkConfig> {
    let config_loader = aws_config::defaults(BehaviorVersion::latest());
    let config_loader = match initialization_conf {
        AwsConfig::Profile(profile) => config_loader.profile_name(profile),
        AwsConfig::RoleArn(arn) => {
            let assumed_role_provider = aws_config::sts::AssumeRoleProvider::builder(arn)
                .session_name("pipeline-launcher-session")
                .build()
                .await;

            let assumed_credentials = match assumed_role_provider.provide_credentials().await {
                Ok(credentials) => credentials,
                Err(e) => {
                    tracing::debug!("Failed to assume role: {}", e);
                    return None;
                }
            };

            config_loader.credentials_provider(assumed_credentials)
        }
        AwsConfig::Env => config_loader,
    };

    let config = match region {
        Some(region) => config_loader.region(Region::new(region.to_string())),
        None => config_loader,
    }
    .load()
    .await;

    let credentials_provider = config.credentials_provider()?;
    if let Err(e) = credentials_provider.provide_credentials().await {
        tracing::debug!("No AWS credentials available: {}", e);
        return None;
    }

    Some(config)
}

/// Tries the requested credential source first and falls back to the environment.
pub async fn resolve_available_aws_config(
    initialization_conf: AwsConfig,
    region: Option<&str>,
) -> Option<SdkConfig> {
    if initialization_conf != AwsConfig::Env {
        let conf = get_initialized_aws_conf(initialization_conf.clone(), region).await;
        if conf.is_some() {
            tracing::info!("Resolved AWS credentials using {:?}", initialization_conf);
            return conf;
        }
        tracing::warn!(
            "Failed to resolve AWS credentials using {:?}",
            initialization_conf
        );
    }

    let env_conf = get_initialized_aws_conf(AwsConfig::Env, region).await;
    if env_conf.is_some() {
        tracing::info!("Resolved AWS credentials using environment.");
        return env_conf;
    }

    tracing::warn!("Could not resolve AWS credentials from profile or environment.");
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::Config;
    use rstest::rstest;

    #[derive(Deserialize)]
    struct Settings {
        aws_init_type: AwsConfig,
    }

    #[rstest]
    #[case::env(AwsConfig::Env)]
    #[case::profile(AwsConfig::Profile("me".into()))]
    #[case::role(AwsConfig::RoleArn("arn:aws:iam::123456789012:role/launcher".into()))]
    fn survives_config_layering(#[case] aws_config: AwsConfig) {
        let settings: Settings = Config::builder()
            .set_default("aws_init_type", aws_config.clone())
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(settings.aws_init_type, aws_config);
    }
}

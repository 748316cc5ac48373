use crate::error::{Result, SlipwayError};
use crate::render::image_tag;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Default config file name, looked up in the working directory.
pub const CONFIG_FILE: &str = "slipway.yaml";

/// Dispatch ceiling used when `concurrent: true` is set.
pub const PARALLEL_UNITS: usize = 5;

// ---------------------------------------------------------------------------
// Environment
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Environment {
    /// Cluster API address, e.g. `http://nomad.staging:4646`.
    #[serde(default)]
    pub nomad_url: String,
    /// Total attempts per cluster API call; `1` disables retry.
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default)]
    pub variables: HashMap<String, String>,
}

fn default_retry_attempts() -> u32 {
    1
}

impl Default for Environment {
    fn default() -> Self {
        Self {
            nomad_url: String::new(),
            retry_attempts: default_retry_attempts(),
            variables: HashMap::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Build
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Build {
    /// Docker build context; defaults to the working directory.
    #[serde(default)]
    pub context: String,
    #[serde(default)]
    pub registry_url: String,
    #[serde(default)]
    pub name: String,
    /// Tags to build; defaults to `latest`.
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub push: bool,
    /// Multi-stage build target.
    #[serde(default)]
    pub target: Option<String>,
    /// Dockerfile path, when not at `<context>/Dockerfile`.
    #[serde(default)]
    pub file: Option<String>,
    /// Tag referenced by `image_<key>` tokens at deploy time.
    #[serde(default)]
    pub deploy_tag: String,
    #[serde(default)]
    pub build_args: BTreeMap<String, String>,
    /// When set, this script runs instead of `docker build`.
    #[serde(default)]
    pub script: Option<String>,
}

impl Build {
    /// Full image references for every configured tag.
    pub fn image_tags(&self) -> Vec<String> {
        if self.tags.is_empty() {
            return vec![image_tag(&self.registry_url, &self.name, "latest")];
        }
        self.tags
            .iter()
            .map(|t| image_tag(&self.registry_url, &self.name, t))
            .collect()
    }

    /// The image reference submitted in rendered job specifications.
    pub fn deploy_image(&self) -> String {
        image_tag(&self.registry_url, &self.name, &self.deploy_tag)
    }
}

// ---------------------------------------------------------------------------
// Deployment
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Deployment {
    #[serde(default)]
    pub builds: HashMap<String, Build>,
    /// Job template path; defaults to `<jobName>.nomad`.
    #[serde(default)]
    pub nomad_file: Option<String>,
    /// Static instance-count hint used when the cluster has no live size.
    #[serde(default)]
    pub start_instances: Option<u64>,
    #[serde(default)]
    pub variables: HashMap<String, String>,
    /// Overrides the derived `<project>-<unit>` job name.
    #[serde(default)]
    pub service_name: Option<String>,
}

impl Deployment {
    pub fn job_name(&self, project: &str, unit: &str) -> String {
        match self.service_name.as_deref() {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => format!("{project}-{unit}"),
        }
    }

    pub fn template_path(&self, job_name: &str) -> PathBuf {
        match self.nomad_file.as_deref() {
            Some(file) if !file.is_empty() => PathBuf::from(file),
            _ => PathBuf::from(format!("{job_name}.nomad")),
        }
    }
}

// ---------------------------------------------------------------------------
// Config (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub name: String,
    #[serde(default)]
    pub concurrent: bool,
    #[serde(default)]
    pub environments: HashMap<String, Environment>,
    #[serde(default)]
    pub deployments: HashMap<String, Deployment>,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(SlipwayError::ConfigNotFound(path.to_path_buf()));
        }
        let data = std::fs::read_to_string(path)?;
        Self::from_yaml(&data)
    }

    /// Parse, substitute environment variables, normalize, and validate.
    pub fn from_yaml(data: &str) -> Result<Self> {
        let mut config: Config = serde_yaml::from_str(data)?;
        config.normalize();
        config.validate()?;
        Ok(config)
    }

    /// The unit dispatch ceiling for this run.
    pub fn concurrency(&self) -> usize {
        if self.concurrent {
            PARALLEL_UNITS
        } else {
            1
        }
    }

    /// Look up an environment, requiring a configured cluster address.
    pub fn environment(&self, name: &str) -> Result<&Environment> {
        self.environments
            .get(name)
            .filter(|env| !env.nomad_url.is_empty())
            .ok_or_else(|| SlipwayError::UnknownEnvironment(name.to_string()))
    }

    fn normalize(&mut self) {
        self.name = expand_env(&self.name);

        for env in self.environments.values_mut() {
            env.nomad_url = expand_env(env.nomad_url.trim_end_matches('/'));
            for value in env.variables.values_mut() {
                *value = expand_env(value);
            }
        }

        for deployment in self.deployments.values_mut() {
            deployment.service_name = deployment.service_name.as_deref().map(expand_env);
            deployment.nomad_file = deployment.nomad_file.as_deref().map(expand_env);
            for value in deployment.variables.values_mut() {
                *value = expand_env(value);
            }
            for build in deployment.builds.values_mut() {
                build.registry_url = expand_env(&build.registry_url);
                build.name = expand_env(&build.name).to_lowercase();
                build.target = build.target.as_deref().map(expand_env);
                build.deploy_tag = registry_safe(&expand_env(&build.deploy_tag));
                build.tags = build
                    .tags
                    .iter()
                    .map(|t| registry_safe(&expand_env(t)))
                    .collect();
                for value in build.build_args.values_mut() {
                    *value = expand_env(value);
                }
            }
        }
    }

    fn validate(&self) -> Result<()> {
        if self.name.len() < 3 {
            return Err(invalid("name", "must be at least 3 characters"));
        }
        if self.environments.is_empty() {
            return Err(invalid("environments", "must contain at least one entry"));
        }
        for (key, env) in &self.environments {
            if url::Url::parse(&env.nomad_url).is_err() {
                return Err(invalid(
                    &format!("environments.{key}.nomad_url"),
                    "must be a valid URL",
                ));
            }
        }
        if self.deployments.is_empty() {
            return Err(invalid("deployments", "must contain at least one entry"));
        }
        for (key, deployment) in &self.deployments {
            if let Some(n) = deployment.start_instances {
                if !(1..=10).contains(&n) {
                    return Err(invalid(
                        &format!("deployments.{key}.start_instances"),
                        "must be between 1 and 10",
                    ));
                }
            }
            for (build_key, build) in &deployment.builds {
                let field = |name: &str| format!("deployments.{key}.builds.{build_key}.{name}");
                if let Some(target) = build.target.as_deref() {
                    if !target.chars().all(char::is_alphanumeric) {
                        return Err(invalid(&field("target"), "must be alphanumeric"));
                    }
                }
                // Script builds are free-form; docker builds need an image.
                if build.script.as_deref().unwrap_or_default().is_empty() {
                    if build.name.len() < 3 {
                        return Err(invalid(&field("name"), "must be at least 3 characters"));
                    }
                    if build.deploy_tag.is_empty() {
                        return Err(invalid(&field("deploy_tag"), "is required"));
                    }
                }
            }
        }
        Ok(())
    }
}

fn invalid(field: &str, reason: &str) -> SlipwayError {
    SlipwayError::InvalidConfig {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Environment-variable substitution
// ---------------------------------------------------------------------------

static ENV_VAR_RE: OnceLock<Regex> = OnceLock::new();

fn env_var_re() -> &'static Regex {
    ENV_VAR_RE.get_or_init(|| {
        Regex::new(r"\$(?:\{([A-Za-z_][A-Za-z0-9_]*)\}|([A-Za-z_][A-Za-z0-9_]*))").unwrap()
    })
}

/// Substitute `${VAR}` and `$VAR` references with the process environment.
/// Unset variables expand to the empty string.
fn expand_env(input: &str) -> String {
    env_var_re()
        .replace_all(input, |caps: &regex::Captures<'_>| {
            let name = caps
                .get(1)
                .or_else(|| caps.get(2))
                .map(|m| m.as_str())
                .unwrap_or_default();
            std::env::var(name).unwrap_or_default()
        })
        .into_owned()
}

/// Lowercase and replace `/` so the value is usable as an image tag segment.
fn registry_safe(value: &str) -> String {
    value.to_lowercase().replace('/', "-")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
name: my-project
environments:
  staging:
    nomad_url: http://nomad.staging:4646
deployments:
  web:
    start_instances: 3
    builds:
      app:
        registry_url: registry.example.com
        name: My-Image
        deploy_tag: Feature/Branch
        tags: [Latest, "V1/2"]
"#;

    #[test]
    fn minimal_config_parses_and_normalizes() {
        let config = Config::from_yaml(MINIMAL).unwrap();
        assert_eq!(config.name, "my-project");
        assert!(!config.concurrent);
        assert_eq!(config.concurrency(), 1);

        let build = &config.deployments["web"].builds["app"];
        assert_eq!(build.name, "my-image");
        assert_eq!(build.deploy_tag, "feature-branch");
        assert_eq!(build.tags, vec!["latest", "v1-2"]);
    }

    #[test]
    fn concurrent_raises_the_ceiling() {
        let yaml = MINIMAL.replacen("name: my-project", "name: my-project\nconcurrent: true", 1);
        let config = Config::from_yaml(&yaml).unwrap();
        assert_eq!(config.concurrency(), PARALLEL_UNITS);
    }

    #[test]
    fn environment_lookup_requires_address() {
        let config = Config::from_yaml(MINIMAL).unwrap();
        assert!(config.environment("staging").is_ok());
        assert!(matches!(
            config.environment("missing"),
            Err(SlipwayError::UnknownEnvironment(name)) if name == "missing"
        ));
    }

    #[test]
    fn env_vars_are_substituted() {
        std::env::set_var("SLIPWAY_TEST_REGION", "eu-west-1");
        let yaml = r#"
name: my-project
environments:
  staging:
    nomad_url: http://nomad.staging:4646
    variables:
      region: ${SLIPWAY_TEST_REGION}
      missing: $SLIPWAY_TEST_UNSET_VAR
deployments:
  web: {}
"#;
        let config = Config::from_yaml(yaml).unwrap();
        let env = &config.environments["staging"];
        assert_eq!(env.variables["region"], "eu-west-1");
        assert_eq!(env.variables["missing"], "");
    }

    #[test]
    fn trailing_slash_is_trimmed_from_address() {
        let yaml = MINIMAL.replace(
            "http://nomad.staging:4646",
            "http://nomad.staging:4646/",
        );
        let config = Config::from_yaml(&yaml).unwrap();
        assert_eq!(
            config.environments["staging"].nomad_url,
            "http://nomad.staging:4646"
        );
    }

    #[test]
    fn short_name_is_rejected() {
        let yaml = MINIMAL.replacen("name: my-project", "name: ab", 1);
        let err = Config::from_yaml(&yaml).unwrap_err();
        assert!(matches!(
            err,
            SlipwayError::InvalidConfig { field, .. } if field == "name"
        ));
    }

    #[test]
    fn invalid_nomad_url_is_rejected() {
        let yaml = MINIMAL.replace("http://nomad.staging:4646", "not a url");
        assert!(Config::from_yaml(&yaml).is_err());
    }

    #[test]
    fn docker_build_requires_name_and_deploy_tag() {
        let yaml = r#"
name: my-project
environments:
  staging:
    nomad_url: http://nomad.staging:4646
deployments:
  web:
    builds:
      app:
        registry_url: registry.example.com
"#;
        let err = Config::from_yaml(yaml).unwrap_err();
        assert!(matches!(
            err,
            SlipwayError::InvalidConfig { field, .. } if field.ends_with(".name")
        ));
    }

    #[test]
    fn script_build_skips_image_validation() {
        let yaml = r#"
name: my-project
environments:
  staging:
    nomad_url: http://nomad.staging:4646
deployments:
  web:
    builds:
      app:
        script: ./build.sh
"#;
        assert!(Config::from_yaml(yaml).is_ok());
    }

    #[test]
    fn start_instances_out_of_range_is_rejected() {
        let yaml = MINIMAL.replace("start_instances: 3", "start_instances: 11");
        assert!(Config::from_yaml(&yaml).is_err());
    }

    #[test]
    fn job_name_prefers_service_name() {
        let deployment = Deployment {
            service_name: Some("my-service".to_string()),
            ..Deployment::default()
        };
        assert_eq!(deployment.job_name("app", "web"), "my-service");
        assert_eq!(Deployment::default().job_name("app", "web"), "app-web");
    }

    #[test]
    fn template_path_defaults_to_job_name() {
        assert_eq!(
            Deployment::default().template_path("my-job"),
            PathBuf::from("my-job.nomad")
        );
        let deployment = Deployment {
            nomad_file: Some("jobs/custom.nomad".to_string()),
            ..Deployment::default()
        };
        assert_eq!(
            deployment.template_path("my-job"),
            PathBuf::from("jobs/custom.nomad")
        );
    }

    #[test]
    fn image_tags_default_to_latest() {
        let build = Build {
            registry_url: "reg.io".to_string(),
            name: "app".to_string(),
            ..Build::default()
        };
        assert_eq!(build.image_tags(), vec!["reg.io/app:latest"]);
    }

    #[test]
    fn missing_config_file_is_reported() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = Config::load(&dir.path().join("slipway.yaml")).unwrap_err();
        assert!(matches!(err, SlipwayError::ConfigNotFound(_)));
    }
}

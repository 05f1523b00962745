use std::collections::HashMap;
use std::fs;
use std::path::{
  Path,
  PathBuf
};
use std::time::Duration;

use anyhow::{
  Context,
  anyhow
};
use tracing::{
  debug,
  info,
  trace,
  warn
};

pub const DEFAULT_BUCKET: &str =
  "maintenance-photos";
pub const DEFAULT_ALLOWED_TYPES: &[&str] = &[
  "image/jpeg",
  "image/jpg",
  "image/png",
  "image/gif",
  "image/webp"
];

#[derive(Debug, Clone)]
pub struct Config {
  map: HashMap<String, String>,
  pub loaded_files: Vec<PathBuf>
}

impl Default for Config {
  fn default() -> Self {
    let mut map = HashMap::new();
    for (k, v) in [
      ("data.location", "~/.portal"),
      ("storage.bucket", DEFAULT_BUCKET),
      ("photos.max_files", "2"),
      ("photos.max_size_mb", "5"),
      (
        "photos.allowed_types",
        "image/jpeg,image/jpg,image/png,\
         image/gif,image/webp"
      ),
      ("session.idle_timeout_minutes", "15"),
      ("session.check_interval_seconds", "60"),
      ("session.retry_delay_ms", "500"),
      ("time.zone", "Europe/Istanbul")
    ] {
      map.insert(
        k.to_string(),
        v.to_string()
      );
    }

    Self {
      map,
      loaded_files: vec![]
    }
  }
}

impl Config {
  #[tracing::instrument(skip(
    portalrc_override
  ))]
  pub fn load(
    portalrc_override: Option<&Path>
  ) -> anyhow::Result<Self> {
    let mut cfg = Config::default();

    let portalrc = resolve_portalrc_path(
      portalrc_override
    )?;
    if let Some(path) = portalrc {
      info!(portalrc = %path.display(), "loading portalrc");
      cfg.load_file(&path)?;
    } else {
      warn!(
        "no portalrc found; using \
         defaults"
      );
    }

    if let Ok(token) =
      std::env::var("PORTAL_TOKEN")
      && !token.trim().is_empty()
    {
      cfg.map.insert(
        "backend.token".to_string(),
        token.trim().to_string()
      );
    }

    Ok(cfg)
  }

  #[tracing::instrument(skip(
    self, overrides
  ))]
  pub fn apply_overrides<I>(
    &mut self,
    overrides: I
  ) where
    I: IntoIterator<
      Item = (String, String)
    >
  {
    for (k, v) in overrides {
      let key = k
        .strip_prefix("rc.")
        .unwrap_or(&k)
        .to_string();
      debug!(key = %key, "applying override");
      self.map.insert(key, v);
    }
  }

  pub fn set(
    &mut self,
    key: &str,
    value: &str
  ) {
    self.map.insert(
      key.to_string(),
      value.to_string()
    );
  }

  pub fn get(
    &self,
    key: &str
  ) -> Option<String> {
    self.map.get(key).cloned()
  }

  pub fn get_bool(
    &self,
    key: &str
  ) -> Option<bool> {
    self
      .map
      .get(key)
      .map(|v| parse_bool(v))
  }

  fn get_number<T>(
    &self,
    key: &str,
    default: T
  ) -> T
  where
    T: std::str::FromStr + Copy
  {
    match self.map.get(key) {
      | None => default,
      | Some(raw) => {
        raw.trim().parse().unwrap_or_else(
          |_| {
            warn!(
              key,
              value = %raw,
              "invalid numeric config value; using default"
            );
            default
          }
        )
      }
    }
  }

  /// Typed view of the keys the portal reads at start-up.
  pub fn settings(
    &self
  ) -> PortalSettings {
    let allowed_types = self
      .get("photos.allowed_types")
      .map(|raw| {
        raw
          .split(',')
          .map(|t| {
            t.trim().to_ascii_lowercase()
          })
          .filter(|t| !t.is_empty())
          .collect::<Vec<_>>()
      })
      .filter(|types| !types.is_empty())
      .unwrap_or_else(|| {
        DEFAULT_ALLOWED_TYPES
          .iter()
          .map(|t| t.to_string())
          .collect()
      });

    PortalSettings {
      backend_url:    self
        .get("backend.url"),
      anon_key:       self
        .get("backend.anon_key"),
      token:          self
        .get("backend.token"),
      bucket:         self
        .get("storage.bucket")
        .unwrap_or_else(|| {
          DEFAULT_BUCKET.to_string()
        }),
      photos:         PhotoLimits {
        max_files: self.get_number(
          "photos.max_files",
          2
        ),
        max_size_bytes: self
          .get_number::<u64>(
            "photos.max_size_mb",
            5
          )
          * 1024
          * 1024,
        allowed_types
      },
      session:        SessionSettings {
        idle_timeout:   Duration::from_secs(
          self.get_number::<u64>(
            "session.idle_timeout_minutes",
            15
          ) * 60
        ),
        check_interval: Duration::from_secs(
          self.get_number(
            "session.check_interval_seconds",
            60
          )
        ),
        retry_delay:    Duration::from_millis(
          self.get_number(
            "session.retry_delay_ms",
            500
          )
        )
      },
      timezone:       self
        .get("time.zone")
        .unwrap_or_else(|| {
          "Europe/Istanbul".to_string()
        })
    }
  }

  #[tracing::instrument(skip(self))]
  fn load_file(
    &mut self,
    path: &Path
  ) -> anyhow::Result<()> {
    let path = expand_tilde(path);
    let text =
      fs::read_to_string(&path)
        .with_context(|| {
          format!(
            "failed to read {}",
            path.display()
          )
        })?;

    self
      .loaded_files
      .push(path.clone());

    let base_dir = path
      .parent()
      .map(|p| p.to_path_buf())
      .unwrap_or_else(|| {
        PathBuf::from(".")
      });

    for (line_num, raw_line) in
      text.lines().enumerate()
    {
      let mut line = raw_line.trim();
      if line.is_empty()
        || line.starts_with('#')
      {
        continue;
      }

      if let Some((before, _)) =
        line.split_once('#')
      {
        line = before.trim();
      }

      if line.is_empty() {
        continue;
      }

      if let Some(include_rest) =
        line.strip_prefix("include ")
      {
        let include_path =
          resolve_include_path(
            &base_dir,
            include_rest.trim()
          )?;
        debug!(
            file = %path.display(),
            include = %include_path.display(),
            line = line_num + 1,
            "processing include"
        );

        if include_path.exists() {
          self
            .load_file(&include_path)?;
        } else {
          warn!(include = %include_path.display(), "include file does not exist; skipping");
        }
        continue;
      }

      let (k, v) = line
        .split_once('=')
        .ok_or_else(|| {
          anyhow!(
            "invalid config line \
             {}:{}: {}",
            path.display(),
            line_num + 1,
            raw_line
          )
        })?;

      let key = k.trim().to_string();
      let value = v.trim().to_string();
      trace!(key = %key, "loaded config key");
      self.map.insert(key, value);
    }

    Ok(())
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PortalSettings {
  pub backend_url: Option<String>,
  pub anon_key:    Option<String>,
  pub token:       Option<String>,
  pub bucket:      String,
  pub photos:      PhotoLimits,
  pub session:     SessionSettings,
  pub timezone:    String
}

impl Default for PortalSettings {
  fn default() -> Self {
    Config::default().settings()
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhotoLimits {
  pub max_files:      usize,
  pub max_size_bytes: u64,
  pub allowed_types:  Vec<String>
}

impl Default for PhotoLimits {
  fn default() -> Self {
    PortalSettings::default().photos
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
  pub idle_timeout:   Duration,
  pub check_interval: Duration,
  pub retry_delay:    Duration
}

impl Default for SessionSettings {
  fn default() -> Self {
    PortalSettings::default().session
  }
}

#[tracing::instrument(skip(
  cfg,
  override_dir
))]
pub fn resolve_data_dir(
  cfg: &Config,
  override_dir: Option<&Path>
) -> anyhow::Result<PathBuf> {
  let dir = if let Some(path) =
    override_dir
  {
    path.to_path_buf()
  } else if let Some(cfg_value) =
    cfg.get("data.location")
  {
    expand_tilde(Path::new(&cfg_value))
  } else {
    default_data_dir()?
  };

  if !dir.exists() {
    info!(dir = %dir.display(), "creating data directory");
    fs::create_dir_all(&dir)
      .with_context(|| {
        format!(
          "failed to create {}",
          dir.display()
        )
      })?;
  }

  Ok(dir)
}

#[tracing::instrument(skip(
  override_path
))]
fn resolve_portalrc_path(
  override_path: Option<&Path>
) -> anyhow::Result<Option<PathBuf>> {
  if let Some(path) = override_path {
    return Ok(Some(path.to_path_buf()));
  }

  if let Ok(rc_env) =
    std::env::var("PORTALRC")
  {
    if rc_env == "/dev/null" {
      return Ok(None);
    }
    return Ok(Some(PathBuf::from(
      rc_env
    )));
  }

  let home = dirs::home_dir()
    .ok_or_else(|| {
      anyhow!(
        "cannot determine home \
         directory"
      )
    })?;
  let candidate =
    home.join(".portalrc");
  if candidate.exists() {
    return Ok(Some(candidate));
  }

  Ok(None)
}

fn default_data_dir()
-> anyhow::Result<PathBuf> {
  let home = dirs::home_dir()
    .ok_or_else(|| {
      anyhow!(
        "cannot determine home \
         directory"
      )
    })?;
  Ok(home.join(".portal"))
}

fn resolve_include_path(
  base_dir: &Path,
  include: &str
) -> anyhow::Result<PathBuf> {
  if include.trim().is_empty() {
    return Err(anyhow!(
      "include path cannot be empty"
    ));
  }

  let raw = PathBuf::from(include);
  let expanded = expand_tilde(&raw);
  if expanded.is_absolute() {
    Ok(expanded)
  } else {
    Ok(base_dir.join(expanded))
  }
}

fn expand_tilde(
  path: &Path
) -> PathBuf {
  let text = path.to_string_lossy();
  if let Some(rest) =
    text.strip_prefix("~/")
    && let Some(home) = dirs::home_dir()
  {
    return home.join(rest);
  }
  path.to_path_buf()
}

fn parse_bool(s: &str) -> bool {
  matches!(
    s.trim()
      .to_ascii_lowercase()
      .as_str(),
    "1" | "y" | "yes" | "on" | "true"
  )
}

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

pub const DEFAULT_API_URL: &str =
  "http://localhost:3000/api";
pub const API_URL_ENV: &str =
  "TASKFOLD_API_URL";
pub const RC_PATH_ENV: &str =
  "TASKFOLDRC";

pub const KEY_API_URL: &str = "api.url";
pub const KEY_API_TIMEOUT: &str =
  "api.timeout";
pub const KEY_COLOR: &str = "color";

#[derive(Debug, Clone)]
pub struct Config {
  map: HashMap<String, String>,
  pub loaded_files: Vec<PathBuf>
}

impl Config {
  pub fn defaults() -> Self {
    let mut cfg = Config {
      map:          HashMap::new(),
      loaded_files: vec![]
    };
    cfg.map.insert(
      KEY_API_URL.to_string(),
      DEFAULT_API_URL.to_string()
    );
    cfg.map.insert(
      KEY_COLOR.to_string(),
      "on".to_string()
    );
    cfg
  }

  #[tracing::instrument(skip(
    rc_override
  ))]
  pub fn load(
    rc_override: Option<&Path>
  ) -> anyhow::Result<Self> {
    let mut cfg = Config::defaults();

    let rc = resolve_rc_path(rc_override)?;
    if let Some(path) = rc {
      info!(rc = %path.display(), "loading taskfoldrc");
      cfg.load_file(&path)?;
    } else {
      debug!(
        "no taskfoldrc found; using \
         defaults"
      );
    }

    cfg.apply_env(
      std::env::var(API_URL_ENV).ok()
    );
    Ok(cfg)
  }

  /// `TASKFOLD_API_URL` sits above the
  /// rc file and below `--rc`.
  pub fn apply_env(
    &mut self,
    api_url: Option<String>
  ) {
    if let Some(url) = api_url
      .map(|v| v.trim().to_string())
      .filter(|v| !v.is_empty())
    {
      debug!(url = %url, "api url from environment");
      self.map.insert(
        KEY_API_URL.to_string(),
        url
      );
    }
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
      debug!(key = %key, value = %v, "applying override");
      self.map.insert(key, v);
    }
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

  pub fn api_url(&self) -> String {
    self
      .get(KEY_API_URL)
      .filter(|v| !v.trim().is_empty())
      .unwrap_or_else(|| {
        DEFAULT_API_URL.to_string()
      })
  }

  /// Unset means requests may wait
  /// indefinitely.
  pub fn api_timeout(
    &self
  ) -> anyhow::Result<Option<Duration>>
  {
    let Some(raw) =
      self.get(KEY_API_TIMEOUT)
    else {
      return Ok(None);
    };
    let raw = raw.trim();
    if raw.is_empty() {
      return Ok(None);
    }
    let secs =
      raw.parse::<f64>().map_err(|_| {
        anyhow!(
          "invalid {KEY_API_TIMEOUT}: \
           {raw}"
        )
      })?;
    if !secs.is_finite() || secs <= 0.0 {
      return Err(anyhow!(
        "{KEY_API_TIMEOUT} must be a \
         positive number of seconds, \
         got {raw}"
      ));
    }
    Ok(Some(Duration::from_secs_f64(
      secs
    )))
  }

  pub fn color_enabled(
    &self
  ) -> anyhow::Result<bool> {
    let raw = self
      .get(KEY_COLOR)
      .unwrap_or_else(|| "on".to_string());
    match raw
      .trim()
      .to_ascii_lowercase()
      .as_str()
    {
      | "on" | "yes" | "true" | "1" => {
        Ok(true)
      }
      | "off" | "no" | "false" | "0" => {
        Ok(false)
      }
      | other => Err(anyhow!(
        "invalid color setting: {other}"
      ))
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
      trace!(key = %key, value = %value, "loaded config key");
      self.map.insert(key, value);
    }

    Ok(())
  }
}

#[tracing::instrument(skip(
  override_path
))]
fn resolve_rc_path(
  override_path: Option<&Path>
) -> anyhow::Result<Option<PathBuf>> {
  if let Some(path) = override_path {
    return Ok(Some(path.to_path_buf()));
  }

  if let Ok(rc_env) =
    std::env::var(RC_PATH_ENV)
  {
    if rc_env == "/dev/null" {
      return Ok(None);
    }
    return Ok(Some(PathBuf::from(
      rc_env
    )));
  }

  let Some(home) = dirs::home_dir()
  else {
    debug!(
      "cannot determine home \
       directory; skipping \
       ~/.taskfoldrc"
    );
    return Ok(None);
  };
  let candidate =
    home.join(".taskfoldrc");
  if candidate.exists() {
    return Ok(Some(candidate));
  }

  Ok(None)
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

#[cfg(test)]
mod tests {
  use std::fs;
  use std::time::Duration;

  use tempfile::tempdir;

  use super::*;

  #[test]
  fn rc_file_with_include_and_precedence()
  {
    let dir =
      tempdir().expect("tempdir");
    let extra = dir.path().join("extra.rc");
    fs::write(
      &extra,
      "api.timeout = 2.5\n"
    )
    .expect("write include");

    let rc = dir.path().join("taskfoldrc");
    fs::write(
      &rc,
      "# remote store\n\
       api.url = http://rc.example/api \
       # inline comment\n\
       color = off\n\
       include extra.rc\n"
    )
    .expect("write rc");

    let mut cfg =
      Config::load(Some(rc.as_path()))
        .expect("load rc");
    assert_eq!(cfg.loaded_files.len(), 2);
    assert!(
      !cfg
        .color_enabled()
        .expect("color flag")
    );
    assert_eq!(
      cfg
        .api_timeout()
        .expect("timeout"),
      Some(Duration::from_millis(2500))
    );

    cfg.apply_env(Some(
      "http://env.example/api"
        .to_string()
    ));
    assert_eq!(
      cfg.api_url(),
      "http://env.example/api"
    );

    cfg.apply_overrides(vec![(
      "rc.api.url".to_string(),
      "http://override.example/api"
        .to_string()
    )]);
    assert_eq!(
      cfg.api_url(),
      "http://override.example/api"
    );
  }

  #[test]
  fn defaults_without_rc() {
    let mut cfg = Config::defaults();
    assert_eq!(
      cfg.api_url(),
      DEFAULT_API_URL
    );
    assert_eq!(
      cfg
        .api_timeout()
        .expect("no timeout"),
      None
    );
    assert_eq!(
      cfg.get_bool(KEY_COLOR),
      Some(true)
    );

    cfg.apply_env(Some("  ".to_string()));
    assert_eq!(
      cfg.api_url(),
      DEFAULT_API_URL
    );
  }

  #[test]
  fn rejects_bad_values() {
    let mut cfg = Config::defaults();
    cfg.apply_overrides(vec![
      (
        "api.timeout".to_string(),
        "-3".to_string()
      ),
      (
        "color".to_string(),
        "sometimes".to_string()
      ),
    ]);
    assert!(cfg.api_timeout().is_err());
    assert!(cfg.color_enabled().is_err());
  }

  #[test]
  fn malformed_line_reports_location() {
    let dir =
      tempdir().expect("tempdir");
    let rc = dir.path().join("bad.rc");
    fs::write(&rc, "api.url\n")
      .expect("write rc");

    let err =
      Config::load(Some(rc.as_path()))
        .expect_err("malformed line");
    assert!(
      err
        .to_string()
        .contains("bad.rc:1")
    );
  }
}

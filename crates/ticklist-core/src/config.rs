use std::collections::HashMap;
use std::fs;
use std::path::{
  Path,
  PathBuf
};

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

use crate::store::DEFAULT_STORAGE_KEY;
use crate::view::{
  SortMode,
  ViewMode
};

const RC_ENV_VAR: &str = "TICKLISTRC";
const RC_FILE_NAME: &str = ".ticklistrc";

#[derive(Debug, Clone)]
pub struct Config {
  map: HashMap<String, String>,
  pub loaded_files: Vec<PathBuf>
}

impl Default for Config {
  fn default() -> Self {
    let mut map = HashMap::new();
    map.insert(
      "data.location".to_string(),
      "~/.ticklist".to_string()
    );
    map.insert(
      "storage.key".to_string(),
      DEFAULT_STORAGE_KEY.to_string()
    );
    map.insert(
      "color".to_string(),
      "on".to_string()
    );
    map.insert(
      "default.view".to_string(),
      ViewMode::default()
        .as_str()
        .to_string()
    );
    map.insert(
      "default.sort".to_string(),
      SortMode::default()
        .as_str()
        .to_string()
    );

    Self {
      map,
      loaded_files: vec![]
    }
  }
}

impl Config {
  #[tracing::instrument(skip(
    rc_override
  ))]
  pub fn load(
    rc_override: Option<&Path>
  ) -> anyhow::Result<Self> {
    let mut cfg = Config::default();

    if let Some(path) =
      resolve_rc_path(rc_override)
    {
      info!(rc = %path.display(), "loading ticklistrc");
      cfg.load_file(&path)?;
    } else {
      debug!(
        "no ticklistrc found; using \
         defaults"
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

  /// `None` when unset; a value that is neither a yes nor a no word is
  /// an error.
  pub fn get_bool(
    &self,
    key: &str
  ) -> anyhow::Result<Option<bool>> {
    self
      .map
      .get(key)
      .map(|v| {
        parse_bool(v).ok_or_else(|| {
          anyhow!(
            "invalid {key} setting: {v}"
          )
        })
      })
      .transpose()
  }

  pub fn storage_key(&self) -> String {
    self
      .get("storage.key")
      .filter(|key| !key.trim().is_empty())
      .unwrap_or_else(|| {
        DEFAULT_STORAGE_KEY.to_string()
      })
  }

  pub fn timezone(
    &self
  ) -> Option<String> {
    self
      .get("timezone")
      .filter(|tz| !tz.trim().is_empty())
  }

  pub fn default_view(
    &self
  ) -> anyhow::Result<ViewMode> {
    self
      .get("default.view")
      .map(|raw| {
        raw.parse::<ViewMode>().with_context(|| {
          "invalid default.view \
           setting"
        })
      })
      .unwrap_or(Ok(ViewMode::default()))
  }

  pub fn default_sort(
    &self
  ) -> anyhow::Result<SortMode> {
    self
      .get("default.sort")
      .map(|raw| {
        raw.parse::<SortMode>().with_context(|| {
          "invalid default.sort \
           setting"
        })
      })
      .unwrap_or(Ok(SortMode::default()))
  }

  #[tracing::instrument(skip(self))]
  fn load_file(
    &mut self,
    path: &Path
  ) -> anyhow::Result<()> {
    let path = expand_tilde(path);
    let text = fs::read_to_string(&path)
      .with_context(|| {
        format!(
          "cannot read rc file {}",
          path.display()
        )
      })?;
    self.loaded_files.push(path.clone());

    let dir = path
      .parent()
      .unwrap_or_else(|| Path::new("."))
      .to_path_buf();

    for (idx, raw) in
      text.lines().enumerate()
    {
      let at = RcSpot {
        file: &path,
        line: idx + 1
      };
      match RcLine::parse(raw)
        .with_context(|| at.to_string())?
      {
        | RcLine::Blank => {}
        | RcLine::Setting(key, value) => {
          trace!(%at, key, value, "rc setting");
          self.map.insert(
            key.to_string(),
            value.to_string()
          );
        }
        | RcLine::Include(target) => {
          self.include(&dir, target, at)?;
        }
      }
    }

    Ok(())
  }

  fn include(
    &mut self,
    dir: &Path,
    target: &str,
    at: RcSpot<'_>
  ) -> anyhow::Result<()> {
    let target = expand_tilde(Path::new(target));
    let target = if target.is_absolute() {
      target
    } else {
      dir.join(target)
    };

    if self.loaded_files.contains(&target) {
      warn!(%at, include = %target.display(), "rc include already loaded; skipping");
      return Ok(());
    }
    if !target.is_file() {
      warn!(%at, include = %target.display(), "rc include not found; skipping");
      return Ok(());
    }

    debug!(%at, include = %target.display(), "following rc include");
    self.load_file(&target)
  }
}

/// One rc line, with `#` comments already stripped.
#[derive(Debug, PartialEq, Eq)]
enum RcLine<'a> {
  Blank,
  Include(&'a str),
  Setting(&'a str, &'a str)
}

impl<'a> RcLine<'a> {
  fn parse(
    raw: &'a str
  ) -> anyhow::Result<Self> {
    let line = raw
      .split_once('#')
      .map_or(raw, |(body, _)| body)
      .trim();

    if line.is_empty() {
      return Ok(RcLine::Blank);
    }
    if let Some(target) =
      line.strip_prefix("include ")
    {
      let target = target.trim();
      if target.is_empty() {
        return Err(anyhow!(
          "include needs a path"
        ));
      }
      return Ok(RcLine::Include(target));
    }

    match line.split_once('=') {
      | Some((key, value))
        if !key.trim().is_empty() =>
      {
        Ok(RcLine::Setting(
          key.trim(),
          value.trim()
        ))
      }
      | _ => Err(anyhow!(
        "expected `key = value`, got {raw:?}"
      ))
    }
  }
}

#[derive(Debug, Clone, Copy)]
struct RcSpot<'a> {
  file: &'a Path,
  line: usize
}

impl std::fmt::Display for RcSpot<'_> {
  fn fmt(
    &self,
    f: &mut std::fmt::Formatter<'_>
  ) -> std::fmt::Result {
    write!(
      f,
      "{}:{}",
      self.file.display(),
      self.line
    )
  }
}

/// `--data` wins over `data.location`; the directory is created if missing.
#[tracing::instrument(skip(cfg))]
pub fn resolve_data_dir(
  cfg: &Config,
  override_dir: Option<&Path>
) -> anyhow::Result<PathBuf> {
  let dir = match (
    override_dir,
    cfg.get("data.location")
  ) {
    | (Some(path), _) => path.to_path_buf(),
    | (None, Some(configured))
      if !configured.trim().is_empty() =>
    {
      expand_tilde(Path::new(
        configured.trim()
      ))
    }
    | _ => dirs::home_dir()
      .map(|home| home.join(".ticklist"))
      .ok_or_else(|| {
        anyhow!(
          "no data.location set and no \
           home directory to default to"
        )
      })?
  };

  if !dir.is_dir() {
    info!(dir = %dir.display(), "creating data directory");
    fs::create_dir_all(&dir).with_context(
      || {
        format!(
          "cannot create data directory {}",
          dir.display()
        )
      }
    )?;
  }

  Ok(dir)
}

/// `--config`, then `$TICKLISTRC` (`/dev/null` turns the rc file off), then
/// `~/.ticklistrc` if it exists.
fn resolve_rc_path(
  explicit: Option<&Path>
) -> Option<PathBuf> {
  if let Some(path) = explicit {
    return Some(path.to_path_buf());
  }

  match std::env::var_os(RC_ENV_VAR) {
    | Some(value) if value == "/dev/null" => {
      None
    }
    | Some(value) => Some(PathBuf::from(value)),
    | None => dirs::home_dir()
      .map(|home| home.join(RC_FILE_NAME))
      .filter(|candidate| candidate.is_file())
  }
}

fn expand_tilde(path: &Path) -> PathBuf {
  match (path.strip_prefix("~"), dirs::home_dir()) {
    | (Ok(rest), Some(home)) => home.join(rest),
    | _ => path.to_path_buf()
  }
}

fn parse_bool(s: &str) -> Option<bool> {
  match s.trim().to_ascii_lowercase().as_str() {
    | "1" | "y" | "yes" | "on" | "true" => Some(true),
    | "0" | "n" | "no" | "off" | "false" => Some(false),
    | _ => None
  }
}

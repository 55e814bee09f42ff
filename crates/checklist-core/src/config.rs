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

use crate::view::{
  FilterMode,
  SortMode
};

pub const RC_ENV: &str = "CHECKLISTRC";
const RC_FILE_NAME: &str =
  ".checklistrc";

#[derive(Debug, Clone)]
pub struct Config {
  map:              HashMap<String, String>,
  pub loaded_files: Vec<PathBuf>
}

impl Default for Config {
  fn default() -> Self {
    let mut map = HashMap::new();
    map.insert(
      "default.sort".to_string(),
      SortMode::default().to_string()
    );
    map.insert(
      "default.filter".to_string(),
      FilterMode::default().to_string()
    );
    map.insert(
      "confirm".to_string(),
      "on".to_string()
    );
    map.insert(
      "color".to_string(),
      "on".to_string()
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

    let rc = resolve_rc_path(
      rc_override
    )?;
    if let Some(path) = rc {
      info!(rc = %path.display(), "loading rc file");
      cfg.load_file(&path)?;
    } else {
      debug!(
        "no rc file found; using \
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
            "invalid value for {key}: \
             {v} (expected on or off)"
          )
        })
      })
      .transpose()
  }

  pub fn sort_mode(
    &self
  ) -> anyhow::Result<SortMode> {
    self
      .get("default.sort")
      .map(|v| v.parse::<SortMode>())
      .transpose()
      .context(
        "invalid default.sort setting"
      )
      .map(Option::unwrap_or_default)
  }

  pub fn filter_mode(
    &self
  ) -> anyhow::Result<FilterMode> {
    self
      .get("default.filter")
      .map(|v| v.parse::<FilterMode>())
      .transpose()
      .context(
        "invalid default.filter setting"
      )
      .map(Option::unwrap_or_default)
  }

  pub fn confirm_deletes(
    &self
  ) -> anyhow::Result<bool> {
    Ok(
      self
        .get_bool("confirm")?
        .unwrap_or(true)
    )
  }

  pub fn color(
    &self
  ) -> anyhow::Result<bool> {
    Ok(
      self
        .get_bool("color")?
        .unwrap_or(true)
    )
  }

  /// Reads one rc file, following its
  /// includes. Each file is keyed by
  /// its canonical path so a file
  /// reached twice, however it is
  /// spelled, is read once.
  #[tracing::instrument(skip(self))]
  fn load_file(
    &mut self,
    path: &Path
  ) -> anyhow::Result<()> {
    let path = fs::canonicalize(path)
      .with_context(|| {
        format!(
          "cannot open rc file {}",
          path.display()
        )
      })?;
    if self.loaded_files.contains(&path)
    {
      warn!(rc = %path.display(), "rc file already loaded; skipping");
      return Ok(());
    }

    let text = fs::read_to_string(&path)
      .with_context(|| {
        format!(
          "failed to read {}",
          path.display()
        )
      })?;
    self
      .loaded_files
      .push(path.clone());

    for (idx, raw) in
      text.lines().enumerate()
    {
      let at = || {
        format!(
          "{}:{}",
          path.display(),
          idx + 1
        )
      };

      match RcLine::parse(raw) {
        | RcLine::Blank => {}
        | RcLine::Include(target) => {
          let target =
            resolve_include(&path, target)
              .with_context(at)?;
          if target.exists() {
            debug!(include = %target.display(), "following include");
            self
              .load_file(&target)
              .with_context(at)?;
          } else {
            warn!(include = %target.display(), "include file does not exist; skipping");
          }
        }
        | RcLine::Setting(key, value) => {
          trace!(key, value, "loaded config key");
          self.map.insert(
            key.to_string(),
            value.to_string()
          );
        }
        | RcLine::Malformed => {
          return Err(anyhow!(
            "invalid config line {}: \
             {raw}",
            at()
          ));
        }
      }
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
    std::env::var(RC_ENV)
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
    warn!(
      "cannot determine home \
       directory; using defaults"
    );
    return Ok(None);
  };
  let candidate =
    home.join(RC_FILE_NAME);
  if candidate.exists() {
    return Ok(Some(candidate));
  }

  Ok(None)
}

#[derive(Debug, PartialEq, Eq)]
enum RcLine<'a> {
  Blank,
  Include(&'a str),
  Setting(&'a str, &'a str),
  Malformed
}

impl<'a> RcLine<'a> {
  fn parse(raw: &'a str) -> Self {
    let line = raw
      .split_once('#')
      .map_or(raw, |(before, _)| before)
      .trim();

    if line.is_empty() {
      return RcLine::Blank;
    }
    if let Some(target) =
      line.strip_prefix("include ")
    {
      return RcLine::Include(
        target.trim()
      );
    }
    match line.split_once('=') {
      | Some((k, v))
        if !k.trim().is_empty() =>
      {
        RcLine::Setting(
          k.trim(),
          v.trim()
        )
      }
      | _ => RcLine::Malformed
    }
  }
}

/// Include targets are relative to
/// the including file; `~/` means the
/// home directory.
fn resolve_include(
  from: &Path,
  target: &str
) -> anyhow::Result<PathBuf> {
  if target.is_empty() {
    return Err(anyhow!(
      "include path cannot be empty"
    ));
  }

  let target = match target
    .strip_prefix("~/")
  {
    | Some(rest) => dirs::home_dir()
      .ok_or_else(|| {
        anyhow!(
          "cannot resolve {target}: no \
           home directory"
        )
      })?
      .join(rest),
    | None => PathBuf::from(target)
  };

  Ok(match from.parent() {
    | Some(dir) => dir.join(target),
    | None => target
  })
}

fn parse_bool(s: &str) -> Option<bool> {
  match s
    .trim()
    .to_ascii_lowercase()
    .as_str()
  {
    | "1" | "y" | "yes" | "on"
    | "true" => Some(true),
    | "0" | "n" | "no" | "off"
    | "false" => Some(false),
    | _ => None
  }
}

#[cfg(test)]
mod tests {
  use std::fs;

  use tempfile::tempdir;

  use super::{
    Config,
    RcLine
  };
  use crate::view::{
    FilterMode,
    SortMode
  };

  #[test]
  fn defaults_match_initial_view() {
    let cfg = Config::default();
    assert_eq!(
      cfg.sort_mode().expect("sort"),
      SortMode::Latest
    );
    assert_eq!(
      cfg
        .filter_mode()
        .expect("filter"),
      FilterMode::All
    );
    assert!(
      cfg
        .confirm_deletes()
        .expect("confirm")
    );
  }

  #[test]
  fn rc_file_with_include_and_comments()
  {
    let dir =
      tempdir().expect("tempdir");
    let extra =
      dir.path().join("extra.rc");
    fs::write(
      &extra,
      "color = off\n"
    )
    .expect("write include");

    let main = dir.path().join("main.rc");
    fs::write(
      &main,
      "# comment\n\
       default.sort = completed-first \
       # trailing\n\
       confirm=no\n\
       include extra.rc\n"
    )
    .expect("write rc");

    let cfg = Config::load(Some(&main))
      .expect("load rc");

    assert_eq!(
      cfg.sort_mode().expect("sort"),
      SortMode::CompletedFirst
    );
    assert!(
      !cfg
        .confirm_deletes()
        .expect("confirm")
    );
    assert!(
      !cfg.color().expect("color")
    );
    assert_eq!(cfg.loaded_files.len(), 2);
  }

  #[test]
  fn overrides_strip_rc_prefix() {
    let mut cfg = Config::default();
    cfg.apply_overrides(vec![(
      "rc.default.filter".to_string(),
      "active".to_string()
    )]);
    assert_eq!(
      cfg
        .filter_mode()
        .expect("filter"),
      FilterMode::Active
    );
  }

  #[test]
  fn invalid_values_are_errors() {
    let mut cfg = Config::default();
    cfg.apply_overrides(vec![
      (
        "default.sort".to_string(),
        "newest".to_string()
      ),
      (
        "confirm".to_string(),
        "maybe".to_string()
      ),
    ]);
    assert!(cfg.sort_mode().is_err());
    assert!(
      cfg.confirm_deletes().is_err()
    );
  }

  #[test]
  fn line_without_equals_is_rejected()
  {
    let dir =
      tempdir().expect("tempdir");
    let rc = dir.path().join("bad.rc");
    fs::write(&rc, "color on\n")
      .expect("write rc");

    let err = Config::load(Some(&rc))
      .expect_err("bad line");
    assert!(
      err
        .to_string()
        .contains("invalid config line")
    );
  }

  #[test]
  fn self_include_through_parent_dir_is_read_once()
  {
    let dir =
      tempdir().expect("tempdir");
    let sub = dir.path().join("x");
    fs::create_dir(&sub)
      .expect("mkdir");
    let main = sub.join("main.rc");
    fs::write(
      &main,
      "include ../x/main.rc\n\
       default.filter = completed\n"
    )
    .expect("write rc");

    let cfg = Config::load(Some(&main))
      .expect("load rc");
    assert_eq!(cfg.loaded_files.len(), 1);
    assert_eq!(
      cfg
        .filter_mode()
        .expect("filter"),
      FilterMode::Completed
    );
  }

  #[test]
  fn mutual_includes_terminate() {
    let dir =
      tempdir().expect("tempdir");
    fs::write(
      dir.path().join("a.rc"),
      "include ./b.rc\ncolor = off\n"
    )
    .expect("write a");
    fs::write(
      dir.path().join("b.rc"),
      "include a.rc\nconfirm = off\n"
    )
    .expect("write b");

    let cfg = Config::load(Some(
      &dir.path().join("a.rc")
    ))
    .expect("load rc");
    assert_eq!(cfg.loaded_files.len(), 2);
    assert!(
      !cfg.color().expect("color")
    );
    assert!(
      !cfg
        .confirm_deletes()
        .expect("confirm")
    );
  }

  #[test]
  fn rc_lines_are_classified() {
    assert_eq!(
      RcLine::parse("  # note"),
      RcLine::Blank
    );
    assert_eq!(
      RcLine::parse("include extra.rc"),
      RcLine::Include("extra.rc")
    );
    assert_eq!(
      RcLine::parse(
        "color = off # quiet"
      ),
      RcLine::Setting("color", "off")
    );
    assert_eq!(
      RcLine::parse("= off"),
      RcLine::Malformed
    );
  }
}

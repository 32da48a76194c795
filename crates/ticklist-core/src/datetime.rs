use std::fs;
use std::path::{
  Path,
  PathBuf
};

use anyhow::{
  Context,
  anyhow
};
use chrono::{
  DateTime,
  Datelike,
  Days,
  Duration,
  LocalResult,
  NaiveDate,
  NaiveDateTime,
  NaiveTime,
  TimeZone,
  Utc,
  Weekday
};
use chrono_tz::Tz;
use regex::Regex;
use serde::Deserialize;

const TIME_FILE_NAME: &str =
  "ticklist-time.toml";
const ZONE_ENV: &str =
  "TICKLIST_TIMEZONE";
const TIME_FILE_ENV: &str =
  "TICKLIST_TIME_CONFIG";

/// `ticklist-time.toml`: either a top-level `timezone` or one under
/// `[time]`.
#[derive(Debug, Default, Deserialize)]
struct TimeFile {
  #[serde(default)]
  timezone: Option<String>,
  #[serde(default)]
  time:     TimeTable
}

#[derive(Debug, Default, Deserialize)]
struct TimeTable {
  #[serde(default)]
  timezone: Option<String>
}

impl TimeFile {
  fn zone_name(self) -> Option<String> {
    self.timezone.or(self.time.timezone)
  }
}

/// Picks the zone that defines "today". The environment wins over the rc
/// value, which wins over `ticklist-time.toml`; anything unparseable falls
/// through to the next source and the last resort is UTC.
pub fn resolve_timezone(
  configured: Option<&str>
) -> Tz {
  let from_env = std::env::var(ZONE_ENV)
    .ok()
    .and_then(|raw| {
      zone_from(&raw, ZONE_ENV)
    });

  from_env
    .or_else(|| {
      configured.and_then(|raw| {
        zone_from(raw, "rc:timezone")
      })
    })
    .or_else(zone_from_time_file)
    .unwrap_or(chrono_tz::UTC)
}

#[must_use]
pub fn local_date(
  dt: DateTime<Utc>,
  tz: Tz
) -> NaiveDate {
  dt.with_timezone(&tz).date_naive()
}

#[must_use]
pub fn format_local_date(
  dt: DateTime<Utc>,
  tz: Tz
) -> String {
  dt.with_timezone(&tz)
    .format("%Y-%m-%d")
    .to_string()
}

/// First instant of `date` in `tz`.
#[must_use]
pub fn start_of_day(
  date: NaiveDate,
  tz: Tz
) -> DateTime<Utc> {
  let midnight =
    date.and_time(NaiveTime::MIN);

  match tz.from_local_datetime(&midnight)
  {
    | LocalResult::Single(local) => {
      local.with_timezone(&Utc)
    }
    | LocalResult::Ambiguous(
      first,
      second
    ) => {
      first.min(second).with_timezone(&Utc)
    }
    | LocalResult::None => {
      // midnight fell into a DST gap; the day starts where the gap ends
      (1..=3)
        .find_map(|hours| {
          tz.from_local_datetime(
            &(midnight
              + Duration::hours(hours))
          )
          .earliest()
        })
        .map(|local| {
          local.with_timezone(&Utc)
        })
        .unwrap_or_else(|| {
          Utc.from_utc_datetime(&midnight)
        })
    }
  }
}

fn time_file_path() -> Option<PathBuf> {
  match std::env::var(TIME_FILE_ENV) {
    | Ok(raw) if !raw.trim().is_empty() => {
      Some(PathBuf::from(raw.trim()))
    }
    | _ => {
      std::env::current_dir()
        .ok()
        .map(|dir| dir.join(TIME_FILE_NAME))
    }
  }
}

fn zone_from_time_file() -> Option<Tz> {
  let path = time_file_path()?;
  match read_time_file(&path) {
    | Ok(Some(name)) => {
      zone_from(
        &name,
        &format!("file:{}", path.display())
      )
    }
    | Ok(None) => None,
    | Err(err) => {
      tracing::error!(
        file = %path.display(),
        error = %format!("{err:#}"),
        "ignoring unreadable time file"
      );
      None
    }
  }
}

fn read_time_file(
  path: &Path
) -> anyhow::Result<Option<String>> {
  if !path.is_file() {
    tracing::trace!(
      file = %path.display(),
      "no time file"
    );
    return Ok(None);
  }

  let text = fs::read_to_string(path)
    .with_context(|| {
      format!(
        "failed to read {}",
        path.display()
      )
    })?;
  let parsed: TimeFile =
    toml::from_str(&text).with_context(
      || {
        format!(
          "failed to parse {}",
          path.display()
        )
      }
    )?;

  let name = parsed.zone_name();
  if name.is_none() {
    tracing::warn!(
      file = %path.display(),
      "time file names no timezone"
    );
  }
  Ok(name)
}

fn zone_from(
  raw: &str,
  source: &str
) -> Option<Tz> {
  let name = raw.trim();
  if name.is_empty() {
    tracing::warn!(source, "empty timezone value");
    return None;
  }

  name
    .parse::<Tz>()
    .inspect(|_| {
      tracing::debug!(source, timezone = name, "timezone selected");
    })
    .inspect_err(|err| {
      tracing::error!(source, timezone = name, error = %err, "unknown timezone id");
    })
    .ok()
}

fn to_utc_from_local(
  local_naive: NaiveDateTime,
  tz: Tz,
  context: &str
) -> anyhow::Result<DateTime<Utc>> {
  match tz.from_local_datetime(
    &local_naive
  ) {
    | LocalResult::Single(local_dt) => {
      Ok(local_dt.with_timezone(&Utc))
    }
    | LocalResult::Ambiguous(
      first,
      second
    ) => {
      tracing::warn!(
        context,
        first = %first,
        second = %second,
        "ambiguous local datetime; using earliest"
      );
      Ok(
        first
          .min(second)
          .with_timezone(&Utc)
      )
    }
    | LocalResult::None => {
      Err(anyhow!(
        "local datetime does not \
         exist in configured \
         timezone: {context}"
      ))
    }
  }
}

/// Parses the due-date expressions accepted by the front end. Day-valued
/// forms resolve to local midnight in `tz`.
#[tracing::instrument(skip(now, tz), fields(input = input))]
pub fn parse_date_expr(
  input: &str,
  now: DateTime<Utc>,
  tz: Tz
) -> anyhow::Result<DateTime<Utc>> {
  let token = input.trim();
  let lower = token.to_ascii_lowercase();
  let today = local_date(now, tz);

  let named_day = match lower.as_str() {
    | "now" => return Ok(now),
    | "today" => Some(today),
    | "tomorrow" => today.succ_opt(),
    | "yesterday" => today.pred_opt(),
    | other => {
      other
        .parse::<Weekday>()
        .ok()
        .and_then(|day| {
          upcoming_weekday(today, day)
        })
    }
  };
  if let Some(day) = named_day {
    return Ok(start_of_day(day, tz));
  }

  if let Some(offset) =
    relative_offset(&lower)?
  {
    return now
      .checked_add_signed(offset)
      .ok_or_else(|| {
        anyhow!(
          "relative date out of range: \
           {input}"
        )
      });
  }

  if let Ok(dt) =
    DateTime::parse_from_rfc3339(token)
  {
    return Ok(dt.with_timezone(&Utc));
  }

  if let Ok(date) = NaiveDate::parse_from_str(
    token, "%Y-%m-%d"
  ) {
    return Ok(start_of_day(date, tz));
  }

  for fmt in
    ["%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M"]
  {
    if let Ok(naive) =
      NaiveDateTime::parse_from_str(
        token, fmt
      )
    {
      return to_utc_from_local(
        naive, tz, fmt
      );
    }
  }

  Err(anyhow!(
    "unrecognized date expression \
     {input:?}; try today, tomorrow, a \
     weekday, +3d, -2h, +1w, 2026-03-01 \
     or 2026-03-01 14:30"
  ))
}

/// `+3d`, `-2h`, `+1w`, `+90m`. `None` when the token has another shape.
fn relative_offset(
  token: &str
) -> anyhow::Result<Option<Duration>> {
  let pattern =
    Regex::new(r"^([+-])(\d+)([wdhm])$")
      .context("relative date pattern")?;
  let Some(caps) = pattern.captures(token)
  else {
    return Ok(None);
  };

  let amount: i64 = caps[2]
    .parse()
    .with_context(|| {
      format!(
        "relative amount too large: {}",
        &caps[2]
      )
    })?;
  let amount = if &caps[1] == "-" {
    -amount
  } else {
    amount
  };

  let offset = match &caps[3] {
    | "w" => Duration::try_weeks(amount),
    | "d" => Duration::try_days(amount),
    | "h" => Duration::try_hours(amount),
    | _ => Duration::try_minutes(amount)
  };
  offset.map(Some).ok_or_else(|| {
    anyhow!("relative offset out of range: {token}")
  })
}

/// The next `target` strictly after `from`; a week ahead when they match.
fn upcoming_weekday(
  from: NaiveDate,
  target: Weekday
) -> Option<NaiveDate> {
  let ahead = (7
    + target.num_days_from_monday()
    - from.weekday().num_days_from_monday())
    % 7;
  let ahead = if ahead == 0 { 7 } else { ahead };
  from.checked_add_days(Days::new(u64::from(ahead)))
}


/// Reads a persisted timestamp. RFC 3339 is what we write; date-only and
/// compact `YYYYMMDDTHHMMSSZ` forms are read as UTC.
pub fn parse_stored_datetime(
  raw: &str
) -> Option<DateTime<Utc>> {
  let trimmed = raw.trim();

  if let Ok(dt) =
    DateTime::parse_from_rfc3339(
      trimmed
    )
  {
    return Some(dt.with_timezone(&Utc));
  }

  if let Ok(ndt) =
    NaiveDateTime::parse_from_str(
      trimmed,
      "%Y%m%dT%H%M%SZ"
    )
  {
    return Some(
      Utc.from_utc_datetime(&ndt)
    );
  }

  NaiveDate::parse_from_str(
    trimmed, "%Y-%m-%d"
  )
  .ok()
  .map(|date| {
    Utc.from_utc_datetime(
      &date.and_time(NaiveTime::MIN)
    )
  })
}

pub mod iso_date_serde {
  use chrono::{
    DateTime,
    SecondsFormat,
    Utc
  };
  use serde::{
    Deserialize,
    Deserializer,
    Serializer
  };

  pub fn serialize<S>(
    dt: &DateTime<Utc>,
    serializer: S
  ) -> Result<S::Ok, S::Error>
  where
    S: Serializer
  {
    serializer.serialize_str(
      &dt.to_rfc3339_opts(
        SecondsFormat::AutoSi,
        true
      )
    )
  }

  pub fn deserialize<'de, D>(
    deserializer: D
  ) -> Result<DateTime<Utc>, D::Error>
  where
    D: Deserializer<'de>
  {
    let raw = String::deserialize(
      deserializer
    )?;
    super::parse_stored_datetime(&raw)
      .ok_or_else(|| {
        serde::de::Error::custom(
          format!(
            "invalid timestamp: {raw}"
          )
        )
      })
  }

  pub mod option {
    use chrono::{
      DateTime,
      Utc
    };
    use serde::{
      Deserialize,
      Deserializer,
      Serializer
    };

    pub fn serialize<S>(
      dt: &Option<DateTime<Utc>>,
      serializer: S
    ) -> Result<S::Ok, S::Error>
    where
      S: Serializer
    {
      match dt {
        | Some(value) => {
          super::serialize(
            value, serializer
          )
        }
        | None => {
          serializer.serialize_none()
        }
      }
    }

    pub fn deserialize<'de, D>(
      deserializer: D
    ) -> Result<
      Option<DateTime<Utc>>,
      D::Error
    >
    where
      D: Deserializer<'de>
    {
      let opt =
        Option::<String>::deserialize(
          deserializer
        )?;
      match opt {
        // Blank means no due date.
        | Some(raw)
          if raw.trim().is_empty() =>
        {
          Ok(None)
        }
        | Some(raw) => {
          super::super::parse_stored_datetime(
            &raw
          )
          .map(Some)
          .ok_or_else(|| {
            serde::de::Error::custom(
              format!(
                "invalid timestamp: \
                 {raw}"
              )
            )
          })
        }
        | None => Ok(None)
      }
    }
  }
}

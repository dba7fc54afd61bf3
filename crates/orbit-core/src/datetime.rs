use chrono::{
  Datelike,
  Days,
  Local,
  NaiveDate,
  Weekday
};

use anyhow::{
  Context,
  anyhow
};
use regex::Regex;

pub const DATE_FORMAT: &str = "%Y-%m-%d";

pub fn today_local() -> NaiveDate {
  Local::now().date_naive()
}

pub fn format_due(
  date: NaiveDate
) -> String {
  date.format(DATE_FORMAT).to_string()
}

/// Parses a due-date expression
/// relative to `today`.
///
/// Accepts `YYYY-MM-DD`, `today`,
/// `tomorrow`, `yesterday`, weekday
/// names (next occurrence, never today)
/// and offsets such as `+3d`, `-1d`,
/// `+2w`.
#[tracing::instrument(skip(today), fields(input = input))]
pub fn parse_due_expr(
  input: &str,
  today: NaiveDate
) -> anyhow::Result<NaiveDate> {
  let token = input.trim();
  let lower =
    token.to_ascii_lowercase();

  match lower.as_str() {
    | "today" => return Ok(today),
    | "tomorrow" => {
      return shift_days(today, 1);
    }
    | "yesterday" => {
      return shift_days(today, -1);
    }
    | _ => {}
  }

  if let Ok(date) =
    NaiveDate::parse_from_str(
      token,
      DATE_FORMAT
    )
  {
    return Ok(date);
  }

  if let Some(weekday) =
    parse_weekday(&lower)
  {
    let current = today
      .weekday()
      .num_days_from_monday()
      as i64;
    let target = weekday
      .num_days_from_monday()
      as i64;
    let mut delta =
      (target - current).rem_euclid(7);
    if delta == 0 {
      delta = 7;
    }
    return shift_days(today, delta);
  }

  let rel_re = Regex::new(r"^(?P<sign>[+-])(?P<num>\d+)(?P<unit>[dw])$")
        .map_err(|e| anyhow!("internal regex compile failure: {e}"))?;

  if let Some(caps) =
    rel_re.captures(&lower)
  {
    let sign = caps
      .name("sign")
      .map(|m| m.as_str())
      .ok_or_else(|| {
        anyhow!("missing relative sign")
      })?;
    let num: i64 = caps
      .name("num")
      .map(|m| m.as_str())
      .ok_or_else(|| {
        anyhow!(
          "missing relative amount"
        )
      })?
      .parse()
      .context(
        "invalid relative number"
      )?;
    let unit = caps
      .name("unit")
      .map(|m| m.as_str())
      .ok_or_else(|| {
        anyhow!("missing relative unit")
      })?;

    let days = match unit {
      | "d" => num,
      | "w" => {
        num.checked_mul(7).ok_or_else(|| {
          anyhow!(
            "relative offset too large: \
             {token}"
          )
        })?
      }
      | other => {
        return Err(anyhow!(
          "unknown relative unit: \
           {other}"
        ));
      }
    };
    let days =
      if sign == "-" { -days } else { days };
    return shift_days(today, days);
  }

  Err(anyhow!(
    "unrecognized due date `{token}`; \
     expected YYYY-MM-DD, today, \
     tomorrow, a weekday or +Nd/+Nw"
  ))
}

fn shift_days(
  date: NaiveDate,
  days: i64
) -> anyhow::Result<NaiveDate> {
  let magnitude = Days::new(
    days.unsigned_abs()
  );
  let shifted = if days >= 0 {
    date.checked_add_days(magnitude)
  } else {
    date.checked_sub_days(magnitude)
  };
  shifted.ok_or_else(|| {
    anyhow!(
      "date out of range: {date} \
       shifted by {days} days"
    )
  })
}

fn parse_weekday(
  s: &str
) -> Option<Weekday> {
  match s {
    | "monday" | "mon" => {
      Some(Weekday::Mon)
    }
    | "tuesday" | "tue" => {
      Some(Weekday::Tue)
    }
    | "wednesday" | "wed" => {
      Some(Weekday::Wed)
    }
    | "thursday" | "thu" => {
      Some(Weekday::Thu)
    }
    | "friday" | "fri" => {
      Some(Weekday::Fri)
    }
    | "saturday" | "sat" => {
      Some(Weekday::Sat)
    }
    | "sunday" | "sun" => {
      Some(Weekday::Sun)
    }
    | _ => None
  }
}

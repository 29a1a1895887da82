//! Energy units for the zero-shot conversion challenges.
//!
//! Scenario descriptions mention quantities such as "250 kWh"; the zero-shot
//! evaluator uses `extract_energy_values` to learn which value and unit the
//! player's prompt should carry over.

use std::fmt;

use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EnergyUnit {
  J,
  KJ,
  MJ,
  GJ,
  Wh,
  KWh,
  MWh,
  GWh,
  Btu,
  Therm,
}

#[derive(Debug, Error, PartialEq)]
pub enum ConversionError {
  #[error("value is not a finite number")]
  InvalidValue,
  #[error("unknown energy unit '{0}'")]
  UnknownUnit(String),
}

/// A quantity found in free text.
#[derive(Clone, Debug, PartialEq)]
pub struct EnergyValue {
  pub value: f64,
  pub unit: EnergyUnit,
  /// Text as it appeared, e.g. "100 kWh".
  pub raw: String,
}

impl EnergyUnit {
  const ALL: [EnergyUnit; 10] = [
    EnergyUnit::J,
    EnergyUnit::KJ,
    EnergyUnit::MJ,
    EnergyUnit::GJ,
    EnergyUnit::Wh,
    EnergyUnit::KWh,
    EnergyUnit::MWh,
    EnergyUnit::GWh,
    EnergyUnit::Btu,
    EnergyUnit::Therm,
  ];

  /// Joules per unit.
  pub fn joules(self) -> f64 {
    match self {
      EnergyUnit::J => 1.0,
      EnergyUnit::KJ => 1e3,
      EnergyUnit::MJ => 1e6,
      EnergyUnit::GJ => 1e9,
      EnergyUnit::Wh => 3600.0,
      EnergyUnit::KWh => 3.6e6,
      EnergyUnit::MWh => 3.6e9,
      EnergyUnit::GWh => 3.6e12,
      EnergyUnit::Btu => 1055.05585,
      EnergyUnit::Therm => 105_505_585.0,
    }
  }

  pub fn symbol(self) -> &'static str {
    match self {
      EnergyUnit::J => "J",
      EnergyUnit::KJ => "kJ",
      EnergyUnit::MJ => "MJ",
      EnergyUnit::GJ => "GJ",
      EnergyUnit::Wh => "Wh",
      EnergyUnit::KWh => "kWh",
      EnergyUnit::MWh => "MWh",
      EnergyUnit::GWh => "GWh",
      EnergyUnit::Btu => "BTU",
      EnergyUnit::Therm => "therm",
    }
  }

  /// Lower-case spelled-out names, singular first.
  pub fn names(self) -> &'static [&'static str] {
    match self {
      EnergyUnit::J => &["joule", "joules"],
      EnergyUnit::KJ => &["kilojoule", "kilojoules"],
      EnergyUnit::MJ => &["megajoule", "megajoules"],
      EnergyUnit::GJ => &["gigajoule", "gigajoules"],
      EnergyUnit::Wh => &["watt-hour", "watt hour", "watthour"],
      EnergyUnit::KWh => &["kilowatt-hour", "kilowatt hour", "kilowatthour"],
      EnergyUnit::MWh => &["megawatt-hour", "megawatt hour", "megawatthour"],
      EnergyUnit::GWh => &["gigawatt-hour", "gigawatt hour", "gigawatthour"],
      EnergyUnit::Btu => &["british thermal unit", "british thermal units"],
      EnergyUnit::Therm => &["therms"],
    }
  }

  /// Symbol only, case-insensitive. This is what counts as a unit inside a
  /// scenario description.
  pub fn from_symbol(s: &str) -> Option<Self> {
    Self::ALL.into_iter().find(|u| u.symbol().eq_ignore_ascii_case(s))
  }

  /// Symbol or spelled-out name, case-insensitive.
  pub fn parse(s: &str) -> Option<Self> {
    let t = s.trim();
    if t.is_empty() {
      return None;
    }
    if let Some(u) = Self::from_symbol(t) {
      return Some(u);
    }
    let lower = t.to_lowercase();
    Self::ALL.into_iter().find(|u| u.names().contains(&lower.as_str()))
  }

  /// True if `normalized` (lower-cased text) names this unit, by symbol as a
  /// whole word or by any spelled-out name.
  pub fn mentioned_in(self, normalized: &str) -> bool {
    let sym = self.symbol().to_lowercase();
    let by_symbol = normalized
      .split(|c: char| !c.is_alphanumeric())
      .any(|w| w == sym || w.trim_start_matches(|c: char| c.is_ascii_digit() || c == '.') == sym);
    by_symbol || self.names().iter().any(|n| normalized.contains(n))
  }
}

impl fmt::Display for EnergyUnit {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.symbol())
  }
}

pub fn to_joules(value: f64, unit: &str) -> Result<f64, ConversionError> {
  if !value.is_finite() {
    return Err(ConversionError::InvalidValue);
  }
  let u = EnergyUnit::parse(unit).ok_or_else(|| ConversionError::UnknownUnit(unit.to_string()))?;
  Ok(value * u.joules())
}

pub fn convert(value: f64, from: &str, to: &str) -> Result<f64, ConversionError> {
  let joules = to_joules(value, from)?;
  let target = EnergyUnit::parse(to).ok_or_else(|| ConversionError::UnknownUnit(to.to_string()))?;
  Ok(joules / target.joules())
}

/// Every "<number> <symbol>" or "<number><symbol>" in `text`, in order.
pub fn extract_energy_values(text: &str) -> Vec<EnergyValue> {
  let tokens: Vec<&str> = text.split_whitespace().collect();
  let mut out = Vec::new();
  let mut i = 0;
  while i < tokens.len() {
    let tok = tokens[i].trim_start_matches(|c: char| !c.is_ascii_digit());
    let num_len = tok
      .char_indices()
      .take_while(|(_, c)| c.is_ascii_digit() || *c == '.')
      .map(|(idx, c)| idx + c.len_utf8())
      .last()
      .unwrap_or(0);
    let number = tok[..num_len].trim_end_matches('.');
    let Ok(value) = number.parse::<f64>() else {
      i += 1;
      continue;
    };

    let suffix = strip_punct(&tok[num_len..]);
    let (unit_text, consumed) = if !suffix.is_empty() {
      (suffix, 1)
    } else if let Some(next) = tokens.get(i + 1) {
      (strip_punct(next), 2)
    } else {
      i += 1;
      continue;
    };

    match EnergyUnit::from_symbol(unit_text) {
      Some(unit) => {
        let raw = if consumed == 1 {
          format!("{}{}", number, unit_text)
        } else {
          format!("{} {}", number, unit_text)
        };
        out.push(EnergyValue { value, unit, raw });
        i += consumed;
      }
      None => i += 1,
    }
  }
  out
}

fn strip_punct(s: &str) -> &str {
  s.trim_matches(|c: char| !c.is_alphanumeric())
}

/// Formats a value the way a player would type it: no trailing ".0".
pub fn format_value(value: f64) -> String {
  format!("{}", value)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn close(a: f64, b: f64) -> bool {
    (a - b).abs() <= b.abs() * 1e-9
  }

  #[test]
  fn kwh_to_joules() {
    assert!(close(to_joules(1.0, "kWh").unwrap(), 3.6e6));
    assert!(close(to_joules(2.0, "kilowatt-hour").unwrap(), 7.2e6));
  }

  #[test]
  fn converts_between_non_joule_units() {
    assert!(close(convert(1.0, "MWh", "kWh").unwrap(), 1000.0));
    assert!(close(convert(100_000.0, "btu", "therm").unwrap(), 100_000.0 * 1055.05585 / 105_505_585.0));
  }

  #[test]
  fn rejects_unknown_units_and_non_finite_values() {
    assert_eq!(to_joules(f64::NAN, "J"), Err(ConversionError::InvalidValue));
    assert_eq!(convert(1.0, "parsec", "J"), Err(ConversionError::UnknownUnit("parsec".into())));
    assert_eq!(convert(1.0, "J", ""), Err(ConversionError::UnknownUnit("".into())));
  }

  #[test]
  fn extracts_spaced_and_joined_quantities() {
    let found = extract_energy_values("A heater uses 2.5 kWh per day, or roughly 9000kJ. Budget: 3 apples.");
    assert_eq!(found.len(), 2);
    assert_eq!(found[0].unit, EnergyUnit::KWh);
    assert!(close(found[0].value, 2.5));
    assert_eq!(found[0].raw, "2.5 kWh");
    assert_eq!(found[1].unit, EnergyUnit::KJ);
    assert!(close(found[1].value, 9000.0));
  }

  #[test]
  fn sentence_final_quantities_are_found() {
    let found = extract_energy_values("Convert 500 BTU.");
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].unit, EnergyUnit::Btu);
  }

  #[test]
  fn unit_mentions_are_whole_words() {
    assert!(EnergyUnit::J.mentioned_in("convert this to j please"));
    assert!(EnergyUnit::J.mentioned_in("answer in joules"));
    assert!(!EnergyUnit::J.mentioned_in("just convert it"));
    assert!(EnergyUnit::KWh.mentioned_in("convert 100kwh"));
  }

  #[test]
  fn value_formatting_drops_trailing_zero() {
    assert_eq!(format_value(100.0), "100");
    assert_eq!(format_value(2.5), "2.5");
  }
}

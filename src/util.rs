//! Small text helpers used by the evaluators and the grader.

/// Very small and safe string templating.
/// Replaces occurrences of `{key}` in the template with provided values.
pub fn fill_template(tpl: &str, pairs: &[(&str, &str)]) -> String {
  let mut out = tpl.to_string();
  for (k, v) in pairs {
    let needle = format!("{{{}}}", k);
    out = out.replace(&needle, v);
  }
  out
}

/// Trimmed, lower-cased form every heuristic check runs against.
pub fn normalize(s: &str) -> String {
  s.trim().to_lowercase()
}

/// Words longer than three characters, lower-cased, stripped of surrounding
/// punctuation, in order of first appearance.
pub fn significant_words(s: &str) -> Vec<String> {
  let mut out: Vec<String> = Vec::new();
  for raw in s.split_whitespace() {
    let w = raw
      .trim_matches(|c: char| !c.is_alphanumeric())
      .to_lowercase();
    if w.chars().count() > 3 && !out.contains(&w) {
      out.push(w);
    }
  }
  out
}

/// Share of `words` found in `haystack`; `None` when there is nothing to look for.
pub fn coverage(haystack: &str, words: &[String]) -> Option<f32> {
  if words.is_empty() {
    return None;
  }
  let hits = words.iter().filter(|w| haystack.contains(w.as_str())).count();
  Some(hits as f32 / words.len() as f32)
}

pub fn contains_any(haystack: &str, needles: &[&str]) -> bool {
  needles.iter().any(|n| haystack.contains(n))
}

/// Every keyword present (case-insensitive). Empty lists count as present.
pub fn contains_all(haystack: &str, keywords: &[String]) -> bool {
  keywords.iter().all(|k| haystack.contains(&k.to_lowercase()))
}

/// Log-safe truncation for large strings.
pub fn trunc_for_log(s: &str, max: usize) -> String {
  if s.chars().count() <= max {
    s.to_string()
  } else {
    let head: String = s.chars().take(max).collect();
    format!("{}… ({} bytes total)", head, s.len())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn significant_words_drop_short_and_duplicate_words() {
    assert_eq!(
      significant_words("Explain solar power. Solar is the key!"),
      vec!["explain", "solar", "power"]
    );
  }

  #[test]
  fn coverage_counts_substring_hits() {
    let words = significant_words("Explain solar power.");
    let c = coverage("tell me about solar power", &words).unwrap();
    assert!(c > 0.6 && c < 0.7);
    assert_eq!(coverage("anything", &[]), None);
  }

  #[test]
  fn fill_template_replaces_every_key() {
    let out = fill_template("{a} and {b} and {a}", &[("a", "x"), ("b", "y")]);
    assert_eq!(out, "x and y and x");
  }

  #[test]
  fn trunc_respects_char_boundaries() {
    let out = trunc_for_log("ééééé", 2);
    assert!(out.starts_with("éé…"));
  }
}

//! Seed data: default catalog content.

use crate::domain::{Challenge, Difficulty};

/// Minimal set of built-in challenges that guarantee the app
/// is useful even without an external challenge bank.
pub fn seed_challenges() -> Vec<Challenge> {
  vec![
    Challenge {
      id: "ch-001".into(),
      slug: "caesar-salad".into(),
      title: "Caesar Salad".into(),
      category: "crypto".into(),
      difficulty: Difficulty::Easy,
      points: 100,
      description: "Recover the plaintext from a shift cipher.".into(),
    },
    Challenge {
      id: "ch-002".into(),
      slug: "cookie-monster".into(),
      title: "Cookie Monster".into(),
      category: "web".into(),
      difficulty: Difficulty::Easy,
      points: 100,
      description: "Find what the session cookie gives away.".into(),
    },
    Challenge {
      id: "ch-003".into(),
      slug: "packet-detective".into(),
      title: "Packet Detective".into(),
      category: "forensics".into(),
      difficulty: Difficulty::Medium,
      points: 200,
      description: "Pull the exfiltrated file out of a capture.".into(),
    },
    Challenge {
      id: "ch-004".into(),
      slug: "query-smuggler".into(),
      title: "Query Smuggler".into(),
      category: "web".into(),
      difficulty: Difficulty::Medium,
      points: 250,
      description: "The login form trusts its input a little too much.".into(),
    },
    Challenge {
      id: "ch-005".into(),
      slug: "stack-overdrive".into(),
      title: "Stack Overdrive".into(),
      category: "pwn".into(),
      difficulty: Difficulty::Hard,
      points: 400,
      description: "A fixed-size buffer and an unchecked read.".into(),
    },
  ]
}

use crate::records::LiveQuote;

/// How a quote's runners line up with a stored match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    Same,
    Swapped,
}

/// Order-insensitive key: canonical words sorted and joined.
pub fn name_key(name: &str) -> Option<String> {
    let mut words = canonical_words(name);
    if words.is_empty() {
        return None;
    }
    words.sort_unstable();
    Some(words.join(" "))
}

/// Same player when the canonical words agree up to order, or when one
/// spelling abbreviates a forename to its initial ("J. Trump", "Trump J").
///
/// The surname always has to match in full.
pub fn same_player(a: &str, b: &str) -> bool {
    let (wa, wb) = (canonical_words(a), canonical_words(b));
    if wa.is_empty() || wb.is_empty() {
        return false;
    }
    if sorted(&wa) == sorted(&wb) {
        return true;
    }
    abbreviated_match(&wa, &wb)
}

fn sorted(words: &[String]) -> Vec<&str> {
    let mut out: Vec<&str> = words.iter().map(String::as_str).collect();
    out.sort_unstable();
    out
}

fn abbreviated_match(a: &[String], b: &[String]) -> bool {
    if a.len() != b.len() || a.len() < 2 {
        return false;
    }
    let forward = b.iter().collect::<Vec<_>>();
    let reversed = b.iter().rev().collect::<Vec<_>>();
    [forward, reversed].iter().any(|order| {
        let mut full = 0;
        let mut initials = 0;
        for (x, y) in a.iter().zip(order) {
            if x == *y {
                full += usize::from(x.chars().count() > 1);
            } else if is_initial_of(x, y) || is_initial_of(y, x) {
                initials += 1;
            } else {
                return false;
            }
        }
        full >= 1 && initials >= 1
    })
}

fn is_initial_of(initial: &str, word: &str) -> bool {
    initial.chars().count() == 1 && prefix(word, 1).as_deref() == Some(initial)
}

#[derive(Debug, Clone)]
struct QuoteKeys {
    p1_key: Option<String>,
    p2_key: Option<String>,
}

/// Live quotes pre-keyed for lookup by a match's two player names.
#[derive(Debug, Clone)]
pub struct QuoteBook<'a> {
    quotes: &'a [LiveQuote],
    keys: Vec<QuoteKeys>,
}

impl<'a> QuoteBook<'a> {
    pub fn new(quotes: &'a [LiveQuote]) -> Self {
        let keys = quotes
            .iter()
            .map(|q| QuoteKeys {
                p1_key: name_key(&q.p1_name),
                p2_key: name_key(&q.p2_name),
            })
            .collect();
        Self { quotes, keys }
    }

    /// Finds the quote for `p1` v `p2`, re-oriented so its P1 prices belong to `p1`.
    pub fn find(&self, p1: &str, p2: &str) -> Option<(usize, LiveQuote)> {
        self.find_where(p1, p2, |_| true)
    }

    /// Like [`QuoteBook::find`] over the quotes `usable` accepts.
    ///
    /// Exact keys win over abbreviated names. An abbreviated hit is only
    /// taken when exactly one quote fits.
    pub fn find_where(
        &self,
        p1: &str,
        p2: &str,
        usable: impl Fn(usize) -> bool,
    ) -> Option<(usize, LiveQuote)> {
        let (k1, k2) = (name_key(p1)?, name_key(p2)?);
        for (i, keys) in self.keys.iter().enumerate() {
            if !usable(i) {
                continue;
            }
            let (Some(q1), Some(q2)) = (&keys.p1_key, &keys.p2_key) else {
                continue;
            };
            if *q1 == k1 && *q2 == k2 {
                return Some((i, self.oriented(i, Orientation::Same)));
            }
            if *q1 == k2 && *q2 == k1 {
                return Some((i, self.oriented(i, Orientation::Swapped)));
            }
        }

        let mut hits = self.quotes.iter().enumerate().filter_map(|(i, q)| {
            if !usable(i) {
                None
            } else if same_player(&q.p1_name, p1) && same_player(&q.p2_name, p2) {
                Some((i, Orientation::Same))
            } else if same_player(&q.p1_name, p2) && same_player(&q.p2_name, p1) {
                Some((i, Orientation::Swapped))
            } else {
                None
            }
        });
        let (i, orientation) = hits.next()?;
        if hits.next().is_some() {
            return None;
        }
        Some((i, self.oriented(i, orientation)))
    }

    pub fn len(&self) -> usize {
        self.quotes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quotes.is_empty()
    }

    pub fn get(&self, i: usize) -> Option<&LiveQuote> {
        self.quotes.get(i)
    }

    fn oriented(&self, i: usize, orientation: Orientation) -> LiveQuote {
        match orientation {
            Orientation::Same => self.quotes[i].clone(),
            Orientation::Swapped => self.quotes[i].swapped(),
        }
    }
}

fn canonical_words(name: &str) -> Vec<String> {
    let mut cleaned = String::with_capacity(name.len());
    for ch in name.chars() {
        if ch.is_alphanumeric() {
            cleaned.extend(ch.to_lowercase());
        } else if matches!(ch, '\'' | '.' | '\u{2019}') {
            // O'Sullivan and OSullivan are the same runner
            continue;
        } else {
            cleaned.push(' ');
        }
    }
    cleaned.split_whitespace().map(str::to_string).collect()
}

fn prefix(raw: &str, n: usize) -> Option<String> {
    if raw.is_empty() {
        return None;
    }
    Some(raw.chars().take(n).collect())
}

//! Position construction.
//!
//! Two policies live here and are deliberately not merged:
//! - [`derive_positions`]: bar-driven four-signal machine, executed with a
//!   one-bar lag via [`execution_lag`].
//! - [`carried_z_positions`]: z-score events forward-filled until a forced
//!   exit, traded on the same bar.

use crate::domain::error::PairtraderError;
use serde::Serialize;
use std::fmt;

/// Shared position for the joint two-leg trade (or a single ticker).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum Position {
    Short,
    #[default]
    Flat,
    Long,
}

impl Position {
    pub fn value(self) -> i8 {
        match self {
            Position::Short => -1,
            Position::Flat => 0,
            Position::Long => 1,
        }
    }

    pub fn as_f64(self) -> f64 {
        f64::from(self.value())
    }

    pub fn is_flat(self) -> bool {
        self == Position::Flat
    }

    pub fn from_value(v: i8) -> Self {
        match v.signum() {
            1 => Position::Long,
            -1 => Position::Short,
            _ => Position::Flat,
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value())
    }
}

/// Four aligned boolean signal series.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Signals {
    pub long_entry: Vec<bool>,
    pub long_exit: Vec<bool>,
    pub short_entry: Vec<bool>,
    pub short_exit: Vec<bool>,
}

impl Signals {
    pub fn new(
        long_entry: Vec<bool>,
        long_exit: Vec<bool>,
        short_entry: Vec<bool>,
        short_exit: Vec<bool>,
    ) -> Result<Self, PairtraderError> {
        let n = long_entry.len();
        if long_exit.len() != n || short_entry.len() != n || short_exit.len() != n {
            return Err(PairtraderError::invalid(
                "signals",
                "all four signal series must have the same length",
            ));
        }
        Ok(Self {
            long_entry,
            long_exit,
            short_entry,
            short_exit,
        })
    }

    /// All-false signals of length `n`.
    pub fn none(n: usize) -> Self {
        Self {
            long_entry: vec![false; n],
            long_exit: vec![false; n],
            short_entry: vec![false; n],
            short_exit: vec![false; n],
        }
    }

    pub fn len(&self) -> usize {
        self.long_entry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.long_entry.is_empty()
    }
}

/// Run the four-signal machine forward over the bars.
///
/// Exits (including an opposite entry) are applied before entries, so an
/// opposite entry flips the position within one bar. Bar 0 starts from its
/// own entry signals.
pub fn derive_positions(signals: &Signals) -> Vec<Position> {
    let mut out = Vec::with_capacity(signals.len());
    let mut prev = Position::Flat;

    for t in 0..signals.len() {
        let le = signals.long_entry[t];
        let lx = signals.long_exit[t];
        let se = signals.short_entry[t];
        let sx = signals.short_exit[t];

        let cur = if t == 0 {
            if le {
                Position::Long
            } else if se {
                Position::Short
            } else {
                Position::Flat
            }
        } else {
            let mut cur = match prev {
                Position::Long if lx || se => Position::Flat,
                Position::Short if sx || le => Position::Flat,
                p => p,
            };
            if cur.is_flat() {
                if le {
                    cur = Position::Long;
                } else if se {
                    cur = Position::Short;
                }
            }
            cur
        };

        out.push(cur);
        prev = cur;
    }
    out
}

/// Shift forward one bar; the first executed position is flat.
pub fn execution_lag(raw: &[Position]) -> Vec<Position> {
    let mut out = Vec::with_capacity(raw.len());
    if !raw.is_empty() {
        out.push(Position::Flat);
        out.extend_from_slice(&raw[..raw.len() - 1]);
    }
    out
}

/// Entry events: `Short` when `z >= entry_z`, `Long` when `z <= -entry_z`.
/// NaN z is no event.
pub fn z_events(z: &[f64], entry_z: f64) -> Vec<Position> {
    z.iter()
        .map(|&v| {
            if v <= -entry_z {
                Position::Long
            } else if v >= entry_z {
                Position::Short
            } else {
                Position::Flat
            }
        })
        .collect()
}

/// Forward-fill non-flat events; bars before the first event are flat.
pub fn carry_events(events: &[Position]) -> Vec<Position> {
    let mut last = Position::Flat;
    events
        .iter()
        .map(|e| {
            if !e.is_flat() {
                last = *e;
            }
            last
        })
        .collect()
}

/// Carried z policy before stop rules: forward-filled events, flattened on
/// bars with `|z| <= exit_z`. Flattening does not reset the carry.
pub fn carried_z_positions(z: &[f64], entry_z: f64, exit_z: f64) -> Vec<Position> {
    let carried = carry_events(&z_events(z, entry_z));
    let exits = z_exit_mask(z, exit_z);
    apply_forced_exits(&carried, &exits)
}

pub fn z_exit_mask(z: &[f64], exit_z: f64) -> Vec<bool> {
    z.iter().map(|v| v.abs() <= exit_z).collect()
}

/// Flatten every bar where `mask` is set.
pub fn apply_forced_exits(positions: &[Position], mask: &[bool]) -> Vec<Position> {
    positions
        .iter()
        .zip(mask)
        .map(|(p, m)| if *m { Position::Flat } else { *p })
        .collect()
}

/// Trade id per bar: increments on every flat→non-flat transition, `None`
/// while flat. A direct flip keeps the current id.
pub fn trade_ids(positions: &[Position]) -> Vec<Option<usize>> {
    let mut id = 0usize;
    let mut prev = Position::Flat;
    positions
        .iter()
        .map(|p| {
            if !p.is_flat() && prev.is_flat() {
                id += 1;
            }
            prev = *p;
            if p.is_flat() { None } else { Some(id) }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use Position::{Flat, Long, Short};

    fn sig(le: &[u8], lx: &[u8], se: &[u8], sx: &[u8]) -> Signals {
        let b = |v: &[u8]| v.iter().map(|x| *x == 1).collect::<Vec<_>>();
        Signals::new(b(le), b(lx), b(se), b(sx)).unwrap()
    }

    #[test]
    fn entry_then_exit_holds_half_open_interval() {
        let s = sig(
            &[0, 1, 0, 0, 0, 0],
            &[0, 0, 0, 0, 1, 0],
            &[0; 6],
            &[0; 6],
        );
        let raw = derive_positions(&s);
        assert_eq!(raw, vec![Flat, Long, Long, Long, Flat, Flat]);
        let exec = execution_lag(&raw);
        assert_eq!(exec, vec![Flat, Flat, Long, Long, Long, Flat]);
    }

    #[test]
    fn first_bar_initialised_from_entry() {
        let s = sig(&[0, 0], &[0, 0], &[1, 0], &[0, 0]);
        assert_eq!(derive_positions(&s), vec![Short, Short]);
        let s = sig(&[1, 0], &[0, 0], &[1, 0], &[0, 0]);
        assert_eq!(derive_positions(&s)[0], Long);
    }

    #[test]
    fn opposite_entry_flips_within_one_bar() {
        // Long exits on short entry; the short entry also fires with the
        // machine now flat, so the flip completes on the same bar.
        let s = sig(&[1, 0, 0], &[0, 0, 0], &[0, 1, 0], &[0, 0, 0]);
        assert_eq!(derive_positions(&s), vec![Long, Short, Short]);
    }

    #[test]
    fn simultaneous_long_entry_and_exit_while_long_reenters() {
        let s = sig(&[1, 1], &[0, 1], &[0, 0], &[0, 0]);
        assert_eq!(derive_positions(&s), vec![Long, Long]);
    }

    #[test]
    fn short_exit_closes_short() {
        let s = sig(&[0, 0, 0], &[0, 0, 0], &[1, 0, 0], &[0, 0, 1]);
        assert_eq!(derive_positions(&s), vec![Short, Short, Flat]);
    }

    #[test]
    fn execution_lag_empty() {
        assert!(execution_lag(&[]).is_empty());
    }

    #[test]
    fn signals_length_mismatch_rejected() {
        assert!(Signals::new(vec![true], vec![], vec![false], vec![false]).is_err());
    }

    #[test]
    fn carried_policy_holds_until_exit_band() {
        let z = [0.0, 2.5, 1.5, 1.0, 0.3, 1.0, -2.1, -1.0];
        let pos = carried_z_positions(&z, 2.0, 0.5);
        assert_eq!(
            pos,
            vec![Flat, Short, Short, Short, Flat, Short, Long, Long]
        );
    }

    #[test]
    fn nan_z_is_neither_event_nor_exit() {
        let z = [-3.0, f64::NAN, 0.1];
        assert_eq!(carried_z_positions(&z, 2.0, 0.5), vec![Long, Long, Flat]);
    }

    #[test]
    fn trade_ids_increment_on_entry_only() {
        let ids = trade_ids(&[Flat, Long, Long, Flat, Short, Long, Flat]);
        assert_eq!(
            ids,
            vec![None, Some(1), Some(1), None, Some(2), Some(2), None]
        );
    }

    #[test]
    fn position_values() {
        assert_eq!(Position::from_value(-3), Short);
        assert_eq!(Long.as_f64(), 1.0);
        assert_eq!(Short.to_string(), "-1");
    }
}

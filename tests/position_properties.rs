//! Property tests for the position state machines.

use pairtrader::domain::position::{
    Position, Signals, carried_z_positions, derive_positions, execution_lag,
};
use proptest::prelude::*;

fn signals_strategy() -> impl Strategy<Value = Signals> {
    (1usize..80).prop_flat_map(|n| {
        (
            prop::collection::vec(any::<bool>(), n),
            prop::collection::vec(any::<bool>(), n),
            prop::collection::vec(any::<bool>(), n),
            prop::collection::vec(any::<bool>(), n),
        )
            .prop_map(|(le, lx, se, sx)| Signals::new(le, lx, se, sx).unwrap())
    })
}

proptest! {
    #[test]
    fn positions_only_change_on_signals(signals in signals_strategy()) {
        let pos = derive_positions(&signals);
        prop_assert_eq!(pos.len(), signals.len());

        for t in 1..pos.len() {
            let (prev, cur) = (pos[t - 1], pos[t]);
            match cur {
                Position::Long if prev != Position::Long => prop_assert!(signals.long_entry[t]),
                Position::Short if prev != Position::Short => prop_assert!(signals.short_entry[t]),
                _ => {}
            }
            if prev == Position::Long && cur != Position::Long {
                prop_assert!(signals.long_exit[t] || signals.short_entry[t]);
            }
            if prev == Position::Short && cur != Position::Short {
                prop_assert!(signals.short_exit[t] || signals.long_entry[t]);
            }
        }
    }

    #[test]
    fn quiet_bars_hold_the_position(signals in signals_strategy()) {
        let pos = derive_positions(&signals);
        for t in 1..pos.len() {
            let quiet = !signals.long_entry[t]
                && !signals.long_exit[t]
                && !signals.short_entry[t]
                && !signals.short_exit[t];
            if quiet {
                prop_assert_eq!(pos[t], pos[t - 1]);
            }
        }
    }

    #[test]
    fn execution_lag_shifts_by_one(signals in signals_strategy()) {
        let raw = derive_positions(&signals);
        let executed = execution_lag(&raw);
        prop_assert_eq!(executed.len(), raw.len());
        prop_assert_eq!(executed[0], Position::Flat);
        prop_assert_eq!(&executed[1..], &raw[..raw.len() - 1]);
    }

    #[test]
    fn carried_z_respects_bands(
        z in prop::collection::vec(-4.0f64..4.0, 1..120),
        exit_z in 0.0f64..1.0,
        gap in 0.1f64..2.0,
    ) {
        let entry_z = exit_z + gap;
        let pos = carried_z_positions(&z, entry_z, exit_z);
        prop_assert_eq!(pos.len(), z.len());
        for (p, v) in pos.iter().zip(&z) {
            if v.abs() <= exit_z {
                prop_assert_eq!(*p, Position::Flat);
            } else if *v >= entry_z {
                prop_assert_eq!(*p, Position::Short);
            } else if *v <= -entry_z {
                prop_assert_eq!(*p, Position::Long);
            }
        }
    }
}

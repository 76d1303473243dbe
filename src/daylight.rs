// EggCam — Daylight Oracle
//
// Decides day/night from the wall clock and the last sunrise/sunset times
// received from the gateway. The gateway only refreshes those at boot, so
// once both events lie in the past the earlier one is rolled forward a day
// (and written back) until at least one of them is ahead of `now`.

use crate::params::{ParamId, ParamStore};

pub const SECONDS_PER_DAY: i64 = 86_400;

/// Stored event times (Unix seconds, 0 = unknown) and user offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SolarEvents {
    pub sunrise: i64,
    pub sunset: i64,
    pub sunrise_offset_min: i64,
    pub sunset_offset_min: i64,
}

impl SolarEvents {
    fn adjusted(&self) -> (i64, i64) {
        (
            self.sunrise + self.sunrise_offset_min * 60,
            self.sunset + self.sunset_offset_min * 60,
        )
    }
}

/// `true` when it is day at `now`. May advance `events.sunrise` /
/// `events.sunset` by whole days.
pub fn evaluate(now: i64, events: &mut SolarEvents) -> bool {
    if events.sunrise == 0 && events.sunset == 0 {
        return false;
    }

    loop {
        let (rise, set) = events.adjusted();
        let rise_past = rise < now;
        let set_past = set < now;

        if rise_past && set_past && events.sunrise != 0 && events.sunset != 0 {
            if rise < set {
                events.sunrise += SECONDS_PER_DAY;
            } else {
                events.sunset += SECONDS_PER_DAY;
            }
            continue;
        }

        return if rise_past && set_past {
            rise > set
        } else if rise_past && events.sunrise != 0 {
            true
        } else {
            // sunset passed last: night; neither passed yet: still night
            false
        };
    }
}

/// `evaluate` over `CasVychodu` / `CasZapadu` and the user offsets, writing
/// rolled-over event times back to the store.
pub fn is_day(params: &ParamStore, now: i64) -> bool {
    let stored = SolarEvents {
        sunrise: params.get(ParamId::CasVychodu) as i64,
        sunset: params.get(ParamId::CasZapadu) as i64,
        sunrise_offset_min: params.get(ParamId::PosunVychodu) as i64,
        sunset_offset_min: params.get(ParamId::PosunZapadu) as i64,
    };
    let mut events = stored;
    let day = evaluate(now, &mut events);

    if events.sunrise != stored.sunrise {
        params.set(ParamId::CasVychodu, events.sunrise as i32);
    }
    if events.sunset != stored.sunset {
        params.set(ParamId::CasZapadu, events.sunset as i32);
    }
    day
}

#[cfg(test)]
mod tests {
    use super::*;

    // 2024-04-11 00:00:00 UTC
    const YESTERDAY: i64 = 1_712_793_600;
    const TODAY: i64 = YESTERDAY + SECONDS_PER_DAY;
    const H: i64 = 3_600;

    fn events(sunrise: i64, sunset: i64) -> SolarEvents {
        SolarEvents { sunrise, sunset, ..Default::default() }
    }

    #[test]
    fn unknown_events_mean_night() {
        assert!(!evaluate(TODAY, &mut events(0, 0)));
    }

    #[test]
    fn between_sunrise_and_sunset_is_day() {
        let mut ev = events(TODAY + 6 * H, TODAY + 18 * H);
        assert!(evaluate(TODAY + 12 * H, &mut ev));
        assert_eq!(ev, events(TODAY + 6 * H, TODAY + 18 * H));
    }

    #[test]
    fn before_sunrise_is_night() {
        assert!(!evaluate(TODAY + 5 * H, &mut events(TODAY + 6 * H, TODAY + 18 * H)));
    }

    #[test]
    fn event_exactly_now_is_not_past() {
        assert!(!evaluate(TODAY + 6 * H, &mut events(TODAY + 6 * H, TODAY + 18 * H)));
    }

    #[test]
    fn offsets_shift_events() {
        let mut ev = SolarEvents {
            sunrise: TODAY + 6 * H,
            sunset: TODAY + 18 * H,
            sunrise_offset_min: 90,
            sunset_offset_min: 0,
        };
        // 07:00 is before the adjusted 07:30 sunrise
        assert!(!evaluate(TODAY + 7 * H, &mut ev));
    }

    #[test]
    fn rolls_both_events_forward_from_yesterday() {
        let mut ev = events(YESTERDAY + 6 * H, YESTERDAY + 18 * H);
        assert!(evaluate(TODAY + 12 * H, &mut ev));
        assert_eq!(ev, events(TODAY + 6 * H, TODAY + 18 * H));
    }

    #[test]
    fn catches_up_several_missed_days() {
        let mut ev = events(YESTERDAY - 2 * SECONDS_PER_DAY + 6 * H, YESTERDAY - 2 * SECONDS_PER_DAY + 18 * H);
        assert!(!evaluate(TODAY + 20 * H, &mut ev));
        assert_eq!(ev, events(TODAY + SECONDS_PER_DAY + 6 * H, TODAY + 18 * H));
    }

    #[test]
    fn is_day_persists_rolled_events() {
        let params = ParamStore::new();
        params.set(ParamId::CasVychodu, (YESTERDAY + 6 * H) as i32);
        params.set(ParamId::CasZapadu, (YESTERDAY + 18 * H) as i32);
        assert!(is_day(&params, TODAY + 12 * H));
        assert_eq!(params.get(ParamId::CasVychodu) as i64, TODAY + 6 * H);
        assert_eq!(params.get(ParamId::CasZapadu) as i64, TODAY + 18 * H);
    }
}

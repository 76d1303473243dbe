// EggCam — Count Publisher

use crate::params::{ParamId, ParamStore};
use crate::syslog::SystemLog;

/// Store a fresh egg count, logging it when it differs from the last one.
pub fn publish(params: &ParamStore, log: &SystemLog, count: usize) {
    let count = count.min(u16::MAX as usize) as i32;
    let previous = params.get(ParamId::PocetVajec);
    if previous != count {
        log.info(format!("Pocet vajicek se zmenil z {previous} na {count}"));
    }
    params.set(ParamId::PocetVajec, count);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeClock;
    use std::sync::Arc;

    #[test]
    fn logs_only_on_change() {
        let params = ParamStore::new();
        let log = SystemLog::new(Arc::new(FakeClock::new(0)));

        publish(&params, &log, 2);
        assert_eq!(params.get(ParamId::PocetVajec), 2);
        assert_eq!(log.pending(), 1);

        publish(&params, &log, 2);
        assert_eq!(log.pending(), 1);

        log.drain();
        assert_eq!(log.history()[0].text, "Pocet vajicek se zmenil z 0 na 2");
    }
}

/// Wall-clock source. The embedding node supplies one; tests steer it.
pub trait Clock {
    fn now_millis(&self) -> u64;
}

/// `std::time` backed clock.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("system clock before unix epoch")
            .as_millis() as u64
    }
}

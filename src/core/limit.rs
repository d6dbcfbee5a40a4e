/// Character budget shared by every buffer written during a run.

use crate::core::error::ErrorKind;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Limit {
    maximum: usize,
    value: usize,
}

impl Limit {
    /// A budget of `maximum` characters. Zero means unlimited.
    pub fn new(maximum: usize) -> Self {
        Self { maximum, value: 0 }
    }

    pub fn maximum(&self) -> usize {
        self.maximum
    }

    pub fn value(&self) -> usize {
        self.value
    }

    pub fn is_unlimited(&self) -> bool {
        self.maximum == 0
    }

    /// Gives back `amount` characters, e.g. when a nested evaluation's
    /// output is discarded.
    pub fn release(&mut self, amount: usize) {
        self.value = self.value.saturating_sub(amount);
    }

    /// Adds `delta` (negative when text is cleared) and fails if the total
    /// now exceeds the maximum.
    pub fn accumulate(&mut self, delta: isize) -> Result<(), ErrorKind> {
        self.value = self.value.saturating_add_signed(delta);
        if self.maximum > 0 && self.value > self.maximum {
            return Err(ErrorKind::CharacterLimit(self.maximum));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unlimited_never_fails() {
        let mut limit = Limit::new(0);
        assert!(limit.is_unlimited());
        assert!(limit.accumulate(1_000_000).is_ok());
    }

    #[test]
    fn fails_on_the_crossing_delta() {
        let mut limit = Limit::new(10);
        assert!(limit.accumulate(6).is_ok());
        assert!(limit.accumulate(4).is_ok());
        assert_eq!(limit.accumulate(1), Err(ErrorKind::CharacterLimit(10)));
    }

    #[test]
    fn clearing_frees_budget() {
        let mut limit = Limit::new(5);
        limit.accumulate(5).unwrap();
        limit.accumulate(-3).unwrap();
        assert_eq!(limit.value(), 2);
        assert!(limit.accumulate(3).is_ok());
        assert!(limit.accumulate(-100).is_ok());
        assert_eq!(limit.value(), 0);
    }
}

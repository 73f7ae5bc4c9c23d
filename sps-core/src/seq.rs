/// A wrapping sequence counter in the range 0-255 for one session.
///
/// Used by edge nodes to stamp outbound messages and by hosts as the expected sequence cursor.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SequenceCounter {
    value: u8,
}

impl SequenceCounter {
    pub fn new() -> Self {
        Self { value: 0 }
    }

    /// Return the current value then advance, wrapping 255 to 0.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> u8 {
        let value = self.value;
        self.value = value.wrapping_add(1);
        value
    }

    pub fn current(&self) -> u8 {
        self.value
    }

    /// True if `candidate` is the expected value, in which case the counter advances.
    pub fn validate(&mut self, candidate: u8) -> bool {
        if candidate != self.value {
            return false;
        }
        self.next();
        true
    }

    pub fn reset(&mut self) {
        self.value = 0;
    }
}

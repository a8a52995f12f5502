type SequenceNumberInnerType = u16;

/// Per-host echo sequence number. Starts at 0 on registration, advances by
/// exactly one per round and wraps at the integer width.
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
pub(crate) struct SequenceNumber(pub SequenceNumberInnerType);

impl SequenceNumber {
    pub(crate) fn start_value() -> Self {
        SequenceNumber(0)
    }

    /// Returns the value to use for the current round and advances to the
    /// next one.
    pub(crate) fn post_increment(&mut self) -> Self {
        let current = *self;
        self.0 = self.0.wrapping_add(1);
        current
    }
}

impl From<SequenceNumber> for SequenceNumberInnerType {
    fn from(value: SequenceNumber) -> Self {
        value.0
    }
}

impl From<SequenceNumberInnerType> for SequenceNumber {
    fn from(value: SequenceNumberInnerType) -> Self {
        SequenceNumber(value)
    }
}

/// 32-channel membership mask. A node renders for a camera only when the two
/// masks share at least one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Layers {
    mask: u32,
}

impl Default for Layers {
    /// Member of channel 0 only.
    fn default() -> Self {
        Self { mask: 1 }
    }
}

impl Layers {
    pub const NONE: Self = Self { mask: 0 };
    pub const ALL: Self = Self { mask: u32::MAX };

    #[must_use]
    pub fn from_mask(mask: u32) -> Self {
        Self { mask }
    }

    #[must_use]
    pub fn mask(self) -> u32 {
        self.mask
    }

    /// Membership of exactly `channel`. Channels above 31 are ignored with a warning.
    pub fn set(&mut self, channel: u32) {
        if let Some(bit) = Self::bit(channel) {
            self.mask = bit;
        }
    }

    pub fn enable(&mut self, channel: u32) {
        if let Some(bit) = Self::bit(channel) {
            self.mask |= bit;
        }
    }

    pub fn disable(&mut self, channel: u32) {
        if let Some(bit) = Self::bit(channel) {
            self.mask &= !bit;
        }
    }

    pub fn toggle(&mut self, channel: u32) {
        if let Some(bit) = Self::bit(channel) {
            self.mask ^= bit;
        }
    }

    pub fn enable_all(&mut self) {
        self.mask = u32::MAX;
    }

    pub fn disable_all(&mut self) {
        self.mask = 0;
    }

    #[must_use]
    pub fn test(self, other: Layers) -> bool {
        self.mask & other.mask != 0
    }

    #[must_use]
    pub fn is_enabled(self, channel: u32) -> bool {
        Self::bit(channel).is_some_and(|bit| self.mask & bit != 0)
    }

    fn bit(channel: u32) -> Option<u32> {
        if channel < 32 {
            Some(1 << channel)
        } else {
            log::warn!("Layers: channel {channel} is out of range (0..32)");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_channel_zero() {
        let layers = Layers::default();
        assert!(layers.is_enabled(0));
        assert!(!layers.is_enabled(1));
    }

    #[test]
    fn test_requires_overlap() {
        let mut a = Layers::default();
        let mut b = Layers::default();
        b.set(3);
        assert!(!a.test(b));
        a.enable(3);
        assert!(a.test(b));
    }

    #[test]
    fn out_of_range_channel_is_ignored() {
        let mut a = Layers::default();
        a.enable(40);
        assert_eq!(a, Layers::default());
    }
}

//! `userAccountControl` bitfield.

/// Typed view over an account's `userAccountControl` flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserAccountControl(u32);

impl UserAccountControl {
    pub const ACCOUNTDISABLE: u32 = 0x0002;
    pub const NORMAL_ACCOUNT: u32 = 0x0200;
    pub const WORKSTATION_TRUST_ACCOUNT: u32 = 0x1000;
    pub const DONT_EXPIRE_PASSWORD: u32 = 0x1_0000;

    /// Parse from the attribute's decimal text form.
    pub fn parse(value: &str) -> Option<Self> {
        value.trim().parse::<u32>().ok().map(Self)
    }

    #[must_use]
    pub fn is_disabled(self) -> bool {
        self.0 & Self::ACCOUNTDISABLE != 0
    }

    /// Set the ACCOUNTDISABLE bit, leaving every other flag untouched.
    #[must_use]
    pub fn disable(self) -> Self {
        Self(self.0 | Self::ACCOUNTDISABLE)
    }
}

impl Default for UserAccountControl {
    fn default() -> Self {
        Self(Self::NORMAL_ACCOUNT)
    }
}

impl From<u32> for UserAccountControl {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl From<UserAccountControl> for u32 {
    fn from(value: UserAccountControl) -> Self {
        value.0
    }
}

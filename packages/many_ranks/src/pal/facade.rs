//! Facade that selects between the real and fake platform at runtime.

use crate::pal::abstractions::{Platform, TimeSample};
#[cfg(test)]
use crate::pal::fake::FakePlatform;
use crate::pal::real::RealPlatform;

/// Enum facade over the available platform implementations.
///
/// Production code always uses the real platform; tests may substitute a fake
/// whose clocks they control.
#[derive(Clone, Debug)]
pub(crate) enum PlatformFacade {
    /// Real operating system clocks.
    Real(&'static RealPlatform),

    /// Fake clocks driven by test code.
    #[cfg(test)]
    Fake(FakePlatform),
}

impl PlatformFacade {
    /// Creates a facade over the real platform.
    pub(crate) fn real() -> Self {
        Self::Real(RealPlatform::instance())
    }
}

impl Platform for PlatformFacade {
    fn now(&self) -> TimeSample {
        match self {
            Self::Real(platform) => platform.now(),
            #[cfg(test)]
            Self::Fake(platform) => platform.now(),
        }
    }
}

#[cfg(test)]
impl From<FakePlatform> for PlatformFacade {
    fn from(platform: FakePlatform) -> Self {
        Self::Fake(platform)
    }
}

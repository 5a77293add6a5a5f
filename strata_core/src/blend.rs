// Copyright 2026 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Blend modes and their GPU blend factors.

/// How a node's pixels are combined with what is already in the target.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum BlendMode {
    /// Inherit the blend mode in effect for the parent.
    #[default]
    Auto,
    /// Standard source-over alpha compositing.
    Normal,
    /// Replace the destination; source alpha is ignored.
    None,
    /// Additive blending.
    Add,
    /// Multiply blend.
    Multiply,
    /// Screen blend.
    Screen,
    /// Erase the destination where the source is opaque.
    Erase,
    /// Draw behind the destination.
    Below,
}

/// A GPU blend factor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BlendFactor {
    /// `0`
    Zero,
    /// `1`
    One,
    /// Source alpha.
    SourceAlpha,
    /// `1 - source alpha`
    OneMinusSourceAlpha,
    /// `1 - source color`
    OneMinusSourceColor,
    /// Destination alpha.
    DestinationAlpha,
    /// `1 - destination alpha`
    OneMinusDestinationAlpha,
    /// Destination color.
    DestinationColor,
}

/// Source and destination factors handed to the backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BlendFactors {
    /// Factor applied to the incoming fragment.
    pub source: BlendFactor,
    /// Factor applied to the existing target pixel.
    pub destination: BlendFactor,
}

impl BlendMode {
    /// Resolves [`Auto`](Self::Auto) against the inherited mode.
    #[must_use]
    pub const fn resolve(self, inherited: Self) -> Self {
        match self {
            Self::Auto => inherited,
            other => other,
        }
    }

    /// Returns the blend factors for this mode.
    ///
    /// `premultiplied_alpha` selects the table for premultiplied or straight
    /// color. [`Auto`](Self::Auto) is treated as [`Normal`](Self::Normal);
    /// callers are expected to [`resolve`](Self::resolve) first.
    #[must_use]
    pub const fn factors(self, premultiplied_alpha: bool) -> BlendFactors {
        use BlendFactor::*;
        let (source, destination) = match (self, premultiplied_alpha) {
            (Self::None, _) => (One, Zero),
            (Self::Auto | Self::Normal, true) => (One, OneMinusSourceAlpha),
            (Self::Auto | Self::Normal, false) => (SourceAlpha, OneMinusSourceAlpha),
            (Self::Add, true) => (One, One),
            (Self::Add, false) => (SourceAlpha, One),
            (Self::Multiply, true) => (DestinationColor, OneMinusSourceAlpha),
            (Self::Multiply, false) => (DestinationColor, OneMinusSourceAlpha),
            (Self::Screen, true) => (One, OneMinusSourceColor),
            (Self::Screen, false) => (SourceAlpha, One),
            (Self::Erase, _) => (Zero, OneMinusSourceAlpha),
            (Self::Below, _) => (OneMinusDestinationAlpha, DestinationAlpha),
        };
        BlendFactors {
            source,
            destination,
        }
    }
}

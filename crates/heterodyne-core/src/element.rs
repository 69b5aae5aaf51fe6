//! Sample element types flowing through the graph.
//!
//! A port carries either real or complex 32-bit float samples. [`ElementKind`]
//! is the runtime tag the connection graph (§4.D) uses to validate that a
//! channel's two endpoints agree on element type, without requiring every
//! [`Stage`](crate::stage::Stage) to be generic over a shared sample trait.

/// 32-bit complex sample, the representation for baseband IQ data.
pub type Complex = num_complex::Complex<f32>;

/// 32-bit real sample, the representation for demodulated audio and RDS
/// baseband signals.
pub type Real = f32;

/// Runtime tag for a port's element type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementKind {
    /// Real scalar samples (`f32`).
    Real,
    /// Complex-pair samples (`Complex<f32>`).
    Complex,
}

impl ElementKind {
    /// Returns the tag for a given concrete element type.
    pub fn of<T: Element>() -> Self {
        T::KIND
    }
}

impl std::fmt::Display for ElementKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ElementKind::Real => write!(f, "real"),
            ElementKind::Complex => write!(f, "complex"),
        }
    }
}

/// Sealed trait implemented for the two concrete sample types the engine
/// supports, used to tie a Rust type to its [`ElementKind`] tag.
pub trait Element: Copy + Default + Send + Sync + 'static {
    /// The runtime tag corresponding to `Self`.
    const KIND: ElementKind;
}

impl Element for Real {
    const KIND: ElementKind = ElementKind::Real;
}

impl Element for Complex {
    const KIND: ElementKind = ElementKind::Complex;
}

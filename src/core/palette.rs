//! Color scheme resolution.
//!
//! A [`ColorScheme`] is a pure function of the current [`Theme`] and the
//! per-instance [`ColorOverrides`]. Backends receive the resolved scheme with
//! every frame and never hold on to it, so a theme flip after mount shows up
//! on the very next frame.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Externally owned color theme signal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Theme {
    #[default]
    Dark,
    Light,
}

impl Theme {
    pub fn from_dark_flag(dark: bool) -> Self {
        if dark {
            Theme::Dark
        } else {
            Theme::Light
        }
    }

    pub fn is_dark(self) -> bool {
        matches!(self, Theme::Dark)
    }

    /// Maximum edge opacity once an edge has fully faded in.
    ///
    /// Dark backgrounds make lines pop, so the ceiling is lower there.
    pub fn edge_opacity_ceiling(self) -> f32 {
        match self {
            Theme::Dark => 0.15,
            Theme::Light => 0.30,
        }
    }
}

/// Straight-alpha RGBA color with components in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Rgba {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Rgba {
    pub const fn rgb8(r: u8, g: u8, b: u8) -> Self {
        Self {
            r: r as f32 / 255.0,
            g: g as f32 / 255.0,
            b: b as f32 / 255.0,
            a: 1.0,
        }
    }

    /// Parse `#rgb`, `#rrggbb` or `#rrggbbaa` (leading `#` optional).
    pub fn from_hex(s: &str) -> Option<Self> {
        let hex = s.trim();
        let hex = hex.strip_prefix('#').unwrap_or(hex);
        if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        let byte = |i: usize| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok();
        let nibble = |i: usize| {
            let v = u8::from_str_radix(hex.get(i..i + 1)?, 16).ok()?;
            Some(v * 17)
        };
        let (r, g, b, a) = match hex.len() {
            3 => (nibble(0)?, nibble(1)?, nibble(2)?, 255),
            6 => (byte(0)?, byte(2)?, byte(4)?, 255),
            8 => (byte(0)?, byte(2)?, byte(4)?, byte(6)?),
            _ => return None,
        };
        Some(Self {
            r: r as f32 / 255.0,
            g: g as f32 / 255.0,
            b: b as f32 / 255.0,
            a: a as f32 / 255.0,
        })
    }

    pub fn with_alpha(self, a: f32) -> Self {
        Self {
            a: a.clamp(0.0, 1.0),
            ..self
        }
    }

    /// Multiply the existing alpha.
    pub fn fade(self, factor: f32) -> Self {
        self.with_alpha(self.a * factor)
    }

    pub fn lerp(self, other: Self, t: f32) -> Self {
        let t = t.clamp(0.0, 1.0);
        Self {
            r: self.r + (other.r - self.r) * t,
            g: self.g + (other.g - self.g) * t,
            b: self.b + (other.b - self.b) * t,
            a: self.a + (other.a - self.a) * t,
        }
    }
}

/// Fully resolved colors for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ColorScheme {
    pub node: Rgba,
    /// Active edges and forward signals.
    pub signal: Rgba,
    /// Negative-weight edges and backward (error) signals.
    pub particle: Rgba,
    pub connection: Rgba,
    /// Core highlight of an activated node.
    pub active_center: Rgba,
}

/// Per-instance hex overrides. Anything unset or unparsable falls through.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ColorOverrides {
    pub node: Option<String>,
    pub signal: Option<String>,
    pub particle: Option<String>,
    pub connection: Option<String>,
}

struct ThemeDefaults {
    node: &'static str,
    signal: &'static str,
    particle: &'static str,
    connection: &'static str,
    active_center: &'static str,
}

const DARK: ThemeDefaults = ThemeDefaults {
    node: "#7aa2ff",
    signal: "#22d3ee",
    particle: "#f472b6",
    connection: "#94a3b8",
    active_center: "#ffffff",
};

const LIGHT: ThemeDefaults = ThemeDefaults {
    node: "#2563eb",
    signal: "#0891b2",
    particle: "#db2777",
    connection: "#475569",
    active_center: "#fef3c7",
};

/// Engine-wide last resort, used only if a built-in entry cannot be parsed.
pub const FALLBACK: ColorScheme = ColorScheme {
    node: Rgba::rgb8(0x64, 0x95, 0xed),
    signal: Rgba::rgb8(0x00, 0xff, 0xff),
    particle: Rgba::rgb8(0xff, 0x69, 0xb4),
    connection: Rgba::rgb8(0x80, 0x80, 0x80),
    active_center: Rgba::rgb8(0xff, 0xff, 0xff),
};

fn pick(over: Option<&str>, builtin: &str, fallback: Rgba) -> Rgba {
    over.and_then(Rgba::from_hex)
        .or_else(|| Rgba::from_hex(builtin))
        .unwrap_or(fallback)
}

/// Resolve a scheme: override, then theme default, then [`FALLBACK`].
pub fn resolve(theme: Theme, overrides: &ColorOverrides) -> ColorScheme {
    let d = match theme {
        Theme::Dark => &DARK,
        Theme::Light => &LIGHT,
    };
    ColorScheme {
        node: pick(overrides.node.as_deref(), d.node, FALLBACK.node),
        signal: pick(overrides.signal.as_deref(), d.signal, FALLBACK.signal),
        particle: pick(overrides.particle.as_deref(), d.particle, FALLBACK.particle),
        connection: pick(
            overrides.connection.as_deref(),
            d.connection,
            FALLBACK.connection,
        ),
        active_center: pick(None, d.active_center, FALLBACK.active_center),
    }
}

/// Holds the last theme/overrides it was told about and the matching scheme.
#[derive(Debug, Clone)]
pub struct ColorSchemeProvider {
    theme: Theme,
    overrides: ColorOverrides,
    scheme: ColorScheme,
}

impl ColorSchemeProvider {
    pub fn new(theme: Theme, overrides: ColorOverrides) -> Self {
        let scheme = resolve(theme, &overrides);
        Self {
            theme,
            overrides,
            scheme,
        }
    }

    pub fn theme(&self) -> Theme {
        self.theme
    }

    pub fn scheme(&self) -> &ColorScheme {
        &self.scheme
    }

    /// Re-resolves synchronously. Returns true if the theme actually changed.
    pub fn set_theme(&mut self, theme: Theme) -> bool {
        let changed = theme != self.theme;
        self.theme = theme;
        self.scheme = resolve(self.theme, &self.overrides);
        changed
    }

    pub fn set_overrides(&mut self, overrides: ColorOverrides) {
        self.overrides = overrides;
        self.scheme = resolve(self.theme, &self.overrides);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: Rgba, b: Rgba) -> bool {
        (a.r - b.r).abs() < 1e-6
            && (a.g - b.g).abs() < 1e-6
            && (a.b - b.b).abs() < 1e-6
            && (a.a - b.a).abs() < 1e-6
    }

    #[test]
    fn hex_forms_parse() {
        let short = Rgba::from_hex("#fff").unwrap();
        assert!(approx(short, Rgba::rgb8(255, 255, 255)));

        let long = Rgba::from_hex("102030").unwrap();
        assert!(approx(long, Rgba::rgb8(0x10, 0x20, 0x30)));

        let alpha = Rgba::from_hex("#00000080").unwrap();
        assert!((alpha.a - 128.0 / 255.0).abs() < 1e-6);

        assert!(Rgba::from_hex("#12345").is_none());
        assert!(Rgba::from_hex("#zzzzzz").is_none());
        assert!(Rgba::from_hex("").is_none());
        assert!(Rgba::from_hex("#ééé").is_none());
        // `from_str_radix` alone would take a sign.
        assert!(Rgba::from_hex("#+f+f+f").is_none());
        assert!(Rgba::from_hex("+fffffff").is_none());
    }

    #[test]
    fn override_beats_theme_default() {
        let overrides = ColorOverrides {
            node: Some("#ff0000".into()),
            ..Default::default()
        };
        let scheme = resolve(Theme::Dark, &overrides);
        assert!(approx(scheme.node, Rgba::rgb8(255, 0, 0)));
        // Untouched slots still come from the theme.
        assert!(approx(scheme.signal, Rgba::from_hex(DARK.signal).unwrap()));
    }

    #[test]
    fn invalid_override_falls_through_silently() {
        let overrides = ColorOverrides {
            connection: Some("not-a-color".into()),
            ..Default::default()
        };
        let scheme = resolve(Theme::Light, &overrides);
        assert!(approx(
            scheme.connection,
            Rgba::from_hex(LIGHT.connection).unwrap()
        ));
    }

    #[test]
    fn fallback_used_when_builtin_is_unusable() {
        let c = pick(None, "garbage", FALLBACK.particle);
        assert!(approx(c, FALLBACK.particle));
    }

    #[test]
    fn theme_change_re_resolves() {
        let mut provider = ColorSchemeProvider::new(Theme::Dark, ColorOverrides::default());
        let dark = *provider.scheme();
        assert!(provider.set_theme(Theme::Light));
        assert_ne!(dark, *provider.scheme());
        assert!(!provider.set_theme(Theme::Light));
        assert_eq!(*provider.scheme(), resolve(Theme::Light, &ColorOverrides::default()));
    }

    #[test]
    fn dark_edges_are_dimmer() {
        assert!(Theme::Dark.edge_opacity_ceiling() < Theme::Light.edge_opacity_ceiling());
    }
}

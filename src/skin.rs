use anyhow::{anyhow, Result};
use eframe::egui::{self, Color32, CornerRadius, Pos2, Rect, RichText, Sense, Stroke, Vec2};
use tracing::warn;

use crate::config::ColorConfig;

const TRACK_THICKNESS: f32 = 6.0;
const THUMB_RADIUS: f32 = 7.0;

fn to_corner_radius(value: f32) -> CornerRadius {
    CornerRadius::same(value.clamp(0.0, u8::MAX as f32).round() as u8)
}

/// Resolved colors for the player window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Skin {
    pub accent: Color32,
    pub art_background: Color32,
    pub meta_background: Color32,
    pub title: Color32,
    pub details: Color32,
}

impl Default for Skin {
    fn default() -> Self {
        Self {
            accent: Color32::from_rgb(0x3d, 0x8b, 0xd9),
            art_background: Color32::DARK_GRAY,
            meta_background: Color32::BLACK,
            title: Color32::WHITE,
            details: Color32::LIGHT_GRAY,
        }
    }
}

impl Skin {
    /// Unparseable entries keep their default and are logged.
    pub fn from_config(colors: &ColorConfig) -> Self {
        let defaults = Skin::default();
        let resolve = |name: &str, value: &Option<String>, fallback: Color32| match value {
            Some(raw) => parse_color(raw).unwrap_or_else(|err| {
                warn!(color = name, error = %err, "ignoring configured color");
                fallback
            }),
            None => fallback,
        };

        Self {
            accent: resolve("accent", &colors.accent, defaults.accent),
            art_background: resolve(
                "art_background",
                &colors.art_background,
                defaults.art_background,
            ),
            meta_background: resolve(
                "meta_background",
                &colors.meta_background,
                defaults.meta_background,
            ),
            title: resolve("title", &colors.title, defaults.title),
            details: resolve("details", &colors.details, defaults.details),
        }
    }

    pub fn apply_style(&self, ctx: &egui::Context) {
        let mut style = (*ctx.style()).clone();
        let corner_radius = to_corner_radius(4.0);

        style.spacing.button_padding = Vec2::new(12.0, 6.0);
        style.spacing.item_spacing.x = style.spacing.item_spacing.x.max(8.0);
        style.spacing.interact_size.y = style.spacing.interact_size.y.max(28.0);

        style.visuals.selection.bg_fill = self.accent;
        style.visuals.selection.stroke = Stroke::new(1.0, self.title);
        style.visuals.hyperlink_color = self.accent;
        style.visuals.slider_trailing_fill = true;

        for widgets in [
            &mut style.visuals.widgets.inactive,
            &mut style.visuals.widgets.hovered,
            &mut style.visuals.widgets.active,
        ] {
            widgets.corner_radius = corner_radius;
        }
        style.visuals.widgets.hovered.bg_stroke = Stroke::new(1.0, self.accent);
        style.visuals.widgets.active.bg_fill = self.accent;
        style.visuals.widgets.active.weak_bg_fill = self.accent;

        ctx.set_style(style);
    }

    pub fn button(&self, ui: &mut egui::Ui, label: impl Into<String>) -> egui::Response {
        let rich = RichText::new(label.into()).size(15.0).strong();
        ui.add_sized(Vec2::new(96.0, 30.0), egui::Button::new(rich))
    }

    pub fn title_text(&self, text: impl Into<String>, size: f32) -> RichText {
        RichText::new(text.into())
            .color(self.title)
            .size(size)
            .strong()
    }

    pub fn details_text(&self, text: impl Into<String>) -> RichText {
        RichText::new(text.into()).color(self.details).size(14.0)
    }

    /// Full-width seek slider. Reports drag start/stop through the response.
    pub fn seek_slider(
        &self,
        ui: &mut egui::Ui,
        value: &mut f64,
        range: std::ops::RangeInclusive<f64>,
        enabled: bool,
    ) -> egui::Response {
        let min = *range.start();
        let max = *range.end();
        let span = (max - min).max(f64::MIN_POSITIVE);
        let sense = if enabled {
            Sense::click_and_drag()
        } else {
            Sense::hover()
        };

        let desired_height = (THUMB_RADIUS * 2.0).max(TRACK_THICKNESS) + 8.0;
        let (rect, mut response) =
            ui.allocate_exact_size(Vec2::new(ui.available_width(), desired_height), sense);

        if enabled && response.hovered() {
            ui.ctx().set_cursor_icon(egui::CursorIcon::PointingHand);
        }

        let thumb_guard = THUMB_RADIUS.min(rect.width().max(1.0) / 2.0);
        let track_min_x = rect.min.x + thumb_guard;
        let track_max_x = rect.max.x - thumb_guard;
        let track_width = (track_max_x - track_min_x).max(1.0);

        if enabled && (response.dragged() || response.drag_started() || response.clicked()) {
            if let Some(pos) = ui.input(|input| input.pointer.interact_pos()) {
                let t = ((pos.x - track_min_x) / track_width).clamp(0.0, 1.0);
                let new_value = min + span * t as f64;
                if (new_value - *value).abs() > f64::EPSILON {
                    *value = new_value;
                    response.mark_changed();
                }
            }
        }

        let fraction = ((*value - min) / span).clamp(0.0, 1.0) as f32;
        let painter = ui.painter_at(rect);
        let track_rect = Rect::from_min_max(
            Pos2::new(track_min_x, rect.center().y - TRACK_THICKNESS / 2.0),
            Pos2::new(track_max_x, rect.center().y + TRACK_THICKNESS / 2.0),
        );
        let rounding = to_corner_radius(TRACK_THICKNESS / 2.0);
        let visuals = ui.visuals();
        painter.rect_filled(track_rect, rounding, visuals.widgets.inactive.bg_fill);

        if fraction > 0.0 {
            let fill_rect = Rect::from_min_max(
                track_rect.min,
                Pos2::new(track_rect.min.x + track_width * fraction, track_rect.max.y),
            );
            painter.rect_filled(fill_rect, rounding, self.accent);
        }

        if enabled {
            let thumb_center =
                Pos2::new(track_min_x + track_width * fraction, track_rect.center().y);
            painter.circle_filled(thumb_center, THUMB_RADIUS, self.title);
        }

        response
    }
}

/// Accepts `#rrggbb`, `#rrggbbaa`, `rgb(r, g, b)`, `rgba(r, g, b, a)` and `transparent`.
pub fn parse_color(value: &str) -> Result<Color32> {
    let v = value.trim();
    if v.eq_ignore_ascii_case("transparent") {
        return Ok(Color32::TRANSPARENT);
    }
    if let Some(hex) = v.strip_prefix('#') {
        return parse_hex_color(hex);
    }
    if let Some(rest) = v.strip_prefix("rgba(") {
        let parts = split_components(rest, 4)?;
        let (r, g, b) = (
            parse_channel(parts[0])?,
            parse_channel(parts[1])?,
            parse_channel(parts[2])?,
        );
        let a = parse_alpha(parts[3])?;
        return Ok(Color32::from_rgba_unmultiplied(r, g, b, a));
    }
    if let Some(rest) = v.strip_prefix("rgb(") {
        let parts = split_components(rest, 3)?;
        return Ok(Color32::from_rgb(
            parse_channel(parts[0])?,
            parse_channel(parts[1])?,
            parse_channel(parts[2])?,
        ));
    }
    Err(anyhow!("Unsupported color format: {v}"))
}

fn parse_hex_color(hex: &str) -> Result<Color32> {
    let value = hex.trim();
    if !matches!(value.len(), 6 | 8) {
        return Err(anyhow!("Invalid hex color: #{value}"));
    }
    let bits =
        u32::from_str_radix(value, 16).map_err(|_| anyhow!("Invalid hex color: #{value}"))?;

    Ok(if value.len() == 6 {
        Color32::from_rgb((bits >> 16) as u8, (bits >> 8) as u8, bits as u8)
    } else {
        Color32::from_rgba_unmultiplied(
            (bits >> 24) as u8,
            (bits >> 16) as u8,
            (bits >> 8) as u8,
            bits as u8,
        )
    })
}

fn split_components(input: &str, expected: usize) -> Result<Vec<&str>> {
    let inner = input
        .strip_suffix(')')
        .ok_or_else(|| anyhow!("Missing closing parenthesis"))?;
    let parts: Vec<_> = inner.split(',').map(str::trim).collect();
    if parts.len() != expected {
        return Err(anyhow!("Expected {expected} color components"));
    }
    Ok(parts)
}

fn parse_channel(src: &str) -> Result<u8> {
    let value: f32 = src
        .parse()
        .map_err(|_| anyhow!("Invalid color channel: {src}"))?;
    if !(0.0..=255.0).contains(&value) {
        return Err(anyhow!("Color channel out of range: {src}"));
    }
    Ok(value.round() as u8)
}

fn parse_alpha(src: &str) -> Result<u8> {
    if src.contains('.') {
        let value: f32 = src.parse().map_err(|_| anyhow!("Invalid alpha: {src}"))?;
        if !(0.0..=1.0).contains(&value) {
            return Err(anyhow!("Alpha out of range: {src}"));
        }
        Ok((value * 255.0).round() as u8)
    } else {
        parse_channel(src)
    }
}

use eframe::egui::{self, Align, ColorImage, Layout, TextureHandle, TextureOptions, Vec2};
use image::RgbaImage;

use crate::{
    metadata::{MediaInfo, ARTWORK_SIZE, UNKNOWN_ALBUM, UNKNOWN_ARTIST, UNKNOWN_TITLE},
    skin::Skin,
};

const META_PANEL_HEIGHT: f32 = 72.0;

/// Album-art panel shown for audio and streams. Owns the artwork texture.
#[derive(Default)]
pub struct AlbumArtView {
    texture: Option<TextureHandle>,
}

impl AlbumArtView {
    /// Uploads the artwork of `info`, or drops the previous texture when there is none.
    pub fn set_info(&mut self, ctx: &egui::Context, info: &MediaInfo) {
        self.texture = info.artwork.as_ref().map(|artwork| {
            ctx.load_texture("album_art", to_color_image(artwork), TextureOptions::LINEAR)
        });
    }

    pub fn clear(&mut self) {
        self.texture = None;
    }

    pub fn show(&self, ui: &mut egui::Ui, skin: &Skin, info: &MediaInfo) {
        let art_height = (ui.available_height() - META_PANEL_HEIGHT).max(0.0);
        let art_size = Vec2::new(ui.available_width(), art_height);

        egui::Frame::new()
            .fill(skin.art_background)
            .show(ui, |ui| {
                ui.set_min_size(art_size);
                ui.set_max_size(art_size);
                ui.centered_and_justified(|ui| match &self.texture {
                    Some(texture) => {
                        let side = (ARTWORK_SIZE as f32).min(art_size.x).min(art_size.y);
                        ui.add(egui::Image::new(texture).fit_to_exact_size(Vec2::splat(side)));
                    }
                    None => {
                        ui.label(skin.details_text("No Artwork"));
                    }
                });
            });

        egui::Frame::new()
            .fill(skin.meta_background)
            .inner_margin(egui::Margin::symmetric(12, 8))
            .show(ui, |ui| {
                ui.set_min_width(ui.available_width());
                ui.with_layout(Layout::top_down(Align::Min), |ui| {
                    ui.label(skin.title_text(title_line(info), 18.0));
                    ui.label(skin.details_text(details_line(info)));
                });
            });
    }
}

pub fn title_line(info: &MediaInfo) -> &str {
    if info.title.is_empty() {
        UNKNOWN_TITLE
    } else {
        &info.title
    }
}

pub fn details_line(info: &MediaInfo) -> String {
    let artist = if info.artist.is_empty() {
        UNKNOWN_ARTIST
    } else {
        &info.artist
    };
    let album = if info.album.is_empty() {
        UNKNOWN_ALBUM
    } else {
        &info.album
    };
    format!("{artist} - {album}")
}

fn to_color_image(image: &RgbaImage) -> ColorImage {
    let size = [image.width() as usize, image.height() as usize];
    ColorImage::from_rgba_unmultiplied(size, image.as_raw())
}

//! Node labels and the HUD readout, shaped and rasterized with glyphon.
//!
//! Positions are computed in logical pixels like the rest of the engine and
//! scaled to surface pixels when the text areas are built.

use flowscope_core::compositor::{Label, Overlay};
use flowscope_core::{Camera, FrameDrawList, NodeId};
use glam::Vec2;
use glyphon::{
    Attrs, Buffer, Cache, Color, Family, FontSystem, Metrics, Resolution, Shaping, SwashCache,
    TextArea, TextAtlas, TextBounds, TextRenderer, Viewport,
};

/// Label font size in logical pixels.
pub const LABEL_FONT_PX: f32 = 11.0;
/// HUD font size in logical pixels.
pub const HUD_FONT_PX: f32 = 13.0;
/// HUD inset from the top-left corner.
const HUD_MARGIN: f32 = 8.0;

const LABEL_COLOR: Color = Color::rgba(0xe5, 0xe7, 0xeb, 0xee);
const HUD_COLOR: Color = Color::rgb(0xf8, 0xfa, 0xfc);
const WARNING_COLOR: Color = Color::rgb(0xf5, 0x9e, 0x0b);

/// Text drawn under a node.
pub fn label_text(node: NodeId) -> String {
    node.to_string()
}

/// `1536` → `1.5 KiB`.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

/// One-line stats readout, or `None` when the list carries no stats overlay.
pub fn stats_text(overlays: &[Overlay]) -> Option<String> {
    overlays.iter().find_map(|overlay| match *overlay {
        Overlay::Stats {
            fps,
            memory_bytes,
            visible_nodes,
            alive_particles,
        } => Some(format!(
            "{fps:.0} fps | {} | {visible_nodes} nodes | {alive_particles} particles",
            format_bytes(memory_bytes)
        )),
        Overlay::PerformanceWarning => None,
    })
}

/// Top-left corner of a label of `width` logical pixels, centered under its node.
pub fn label_origin(label: &Label, camera: &Camera, width: f32) -> Vec2 {
    let center = camera.world_to_screen(label.anchor);
    Vec2::new(center.x - width * 0.5, center.y + label.offset)
}

/// A shaped line of text, reshaped only when its content changes.
struct TextLine {
    buffer: Buffer,
    text: String,
}

impl TextLine {
    fn new(font_system: &mut FontSystem, font_px: f32) -> Self {
        let mut buffer = Buffer::new(font_system, Metrics::new(font_px, font_px * 1.25));
        buffer.set_size(font_system, None, None);
        Self {
            buffer,
            text: String::new(),
        }
    }

    fn set(&mut self, font_system: &mut FontSystem, text: &str) {
        if self.text == text {
            return;
        }
        self.text.clear();
        self.text.push_str(text);
        self.buffer.set_text(
            font_system,
            text,
            Attrs::new().family(Family::SansSerif),
            Shaping::Basic,
        );
        self.buffer.shape_until_scroll(font_system, false);
    }

    /// Widest laid-out line in logical pixels.
    fn width(&self) -> f32 {
        self.buffer
            .layout_runs()
            .map(|run| run.line_w)
            .fold(0.0, f32::max)
    }
}

/// Text program drawn last, over the scene and particles.
pub struct TextOverlay {
    font_system: FontSystem,
    swash_cache: SwashCache,
    viewport: Viewport,
    atlas: TextAtlas,
    renderer: TextRenderer,
    /// Grows to the largest label count seen; only the first `label_count` are drawn
    labels: Vec<TextLine>,
    label_count: usize,
    hud: TextLine,
    warning: TextLine,
    show_hud: bool,
    show_warning: bool,
}

impl TextOverlay {
    pub fn new(device: &wgpu::Device, queue: &wgpu::Queue, format: wgpu::TextureFormat) -> Self {
        let mut font_system = FontSystem::new();
        let faces = font_system.db().len();
        if faces == 0 {
            tracing::warn!("No system fonts found, labels and HUD text will be empty");
        } else {
            tracing::info!(faces, "Text overlay ready");
        }

        let cache = Cache::new(device);
        let viewport = Viewport::new(device, &cache);
        let mut atlas = TextAtlas::new(device, queue, &cache, format);
        let renderer = TextRenderer::new(&mut atlas, device, wgpu::MultisampleState::default(), None);

        let hud = TextLine::new(&mut font_system, HUD_FONT_PX);
        let mut warning = TextLine::new(&mut font_system, HUD_FONT_PX);
        warning.set(&mut font_system, "Performance mode");

        Self {
            font_system,
            swash_cache: SwashCache::new(),
            viewport,
            atlas,
            renderer,
            labels: Vec::new(),
            label_count: 0,
            hud,
            warning,
            show_hud: false,
            show_warning: false,
        }
    }

    /// Shape this frame's text and upload glyphs.
    ///
    /// `surface` is the swapchain size; `logical_size` the engine's surface
    /// size. Their ratio scales text to the quality's resolution.
    pub fn prepare(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        list: &FrameDrawList,
        camera: &Camera,
        logical_size: Vec2,
        surface: (u32, u32),
    ) {
        let scale = if logical_size.x > 0.0 {
            surface.0 as f32 / logical_size.x
        } else {
            1.0
        };
        self.viewport.update(
            queue,
            Resolution {
                width: surface.0,
                height: surface.1,
            },
        );

        self.label_count = list.labels.len();
        while self.labels.len() < self.label_count {
            self.labels.push(TextLine::new(&mut self.font_system, LABEL_FONT_PX));
        }
        for (line, label) in self.labels.iter_mut().zip(&list.labels) {
            line.set(&mut self.font_system, &label_text(label.node));
        }

        self.show_warning = list.overlays.contains(&Overlay::PerformanceWarning);
        self.show_hud = match stats_text(&list.overlays) {
            Some(text) => {
                self.hud.set(&mut self.font_system, &text);
                true
            }
            None => false,
        };

        let mut areas = Vec::with_capacity(self.label_count + 2);
        for (line, label) in self.labels.iter().zip(&list.labels) {
            let origin = label_origin(label, camera, line.width());
            if origin.x > logical_size.x || origin.y > logical_size.y {
                continue;
            }
            areas.push(area(&line.buffer, origin, scale, LABEL_COLOR));
        }
        let mut hud_y = HUD_MARGIN;
        if self.show_warning {
            areas.push(area(&self.warning.buffer, Vec2::new(HUD_MARGIN, hud_y), scale, WARNING_COLOR));
            hud_y += HUD_FONT_PX * 1.5;
        }
        if self.show_hud {
            areas.push(area(&self.hud.buffer, Vec2::new(HUD_MARGIN, hud_y), scale, HUD_COLOR));
        }

        if let Err(e) = self.renderer.prepare(
            device,
            queue,
            &mut self.font_system,
            &mut self.atlas,
            &self.viewport,
            areas,
            &mut self.swash_cache,
        ) {
            tracing::warn!("Text prepare failed: {}", e);
        }
    }

    pub fn draw(&self, pass: &mut wgpu::RenderPass<'_>) {
        if let Err(e) = self.renderer.render(&self.atlas, &self.viewport, pass) {
            tracing::warn!("Text render failed: {}", e);
        }
    }

    /// Evict glyphs unused since the last prepare.
    pub fn trim(&mut self) {
        self.atlas.trim();
    }
}

fn area(buffer: &Buffer, origin: Vec2, scale: f32, color: Color) -> TextArea<'_> {
    TextArea {
        buffer,
        left: origin.x * scale,
        top: origin.y * scale,
        scale,
        bounds: TextBounds::default(),
        default_color: color,
        custom_glyphs: &[],
    }
}

use crate::{
    error::{ExportError, WorkflowError},
    models::{ImageRef, Scene, Session, Stage},
    provider::Services,
};
use printpdf::image_crate::DynamicImage;
use printpdf::*;
use std::{fs::File, io::BufWriter, path::Path};
use tracing::{info, warn};

const PAGE_W: f32 = 210.0;
const PAGE_H: f32 = 297.0;
const MARGIN: f32 = 15.0;
const CONTENT_W: f32 = PAGE_W - 2.0 * MARGIN;
const FOOTER_Y: f32 = 8.0;
const PT_TO_MM: f32 = 0.3528;
/// Space that must remain before a scene block starts on the current page.
const SCENE_MIN_SPACE: f32 = 70.0;
/// Space that must remain before an illustration is placed.
const IMAGE_MIN_SPACE: f32 = 80.0;

pub const SCENES_HEADING: &str = "Scenes and Illustrations";
pub const PLACEHOLDER_FAILED: &str = "[Illustration could not be generated]";
pub const PLACEHOLDER_UNSET: &str = "[No illustration]";

/// What goes under a scene: the decoded image or a line of text.
pub enum Illustration {
    Image(DynamicImage),
    Placeholder(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontKind {
    Regular,
    Bold,
    Italic,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Draw {
    Text { text: String, size: f32, font: FontKind, x: f32, y: f32 },
    Image { scene: usize, x: f32, y: f32, width: f32, height: f32, dpi: f32 },
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct PageLayout {
    pub items: Vec<Draw>,
}

#[cfg(test)]
impl PageLayout {
    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.items.iter().filter_map(|d| match d {
            Draw::Text { text, .. } => Some(text.as_str()),
            Draw::Image { .. } => None,
        })
    }
}

/// Exports the session as a PDF: title, story, then every scene with its
/// illustration or a placeholder. Missing illustrations never abort it.
pub async fn export_pdf(session: &Session, services: &Services) -> Result<Vec<u8>, WorkflowError> {
    let outline = session.outline.as_ref().ok_or(WorkflowError::MissingPrerequisite { stage: Stage::Complete, missing: "outline" })?;
    let scenes = session.scenes.as_deref().ok_or(WorkflowError::MissingPrerequisite { stage: Stage::Complete, missing: "scenes" })?;
    let story = session.story_text.as_deref().ok_or(WorkflowError::MissingPrerequisite { stage: Stage::Complete, missing: "story_text" })?;
    let slots = session.illustrations.as_deref().unwrap_or(&[]);

    info!("📄 Exporting PDF for '{}' ({} scenes)", outline.title, scenes.len());
    let illustrations = resolve_illustrations(scenes.len(), slots, services).await;
    let pdf = render_pdf(&outline.title, story, scenes, &illustrations, services.settings.pdf_font.as_deref())?;
    info!("✅ PDF ready ({} bytes)", pdf.len());
    Ok(pdf)
}

/// Fetches and decodes each resolved slot; trailing missing slots count as unset.
pub async fn resolve_illustrations(scene_count: usize, slots: &[ImageRef], services: &Services) -> Vec<Illustration> {
    let mut out = Vec::with_capacity(scene_count);
    for i in 0..scene_count {
        let illustration = match slots.get(i) {
            Some(ImageRef::Resolved(reference)) => match services.fetcher.fetch(reference, services.settings.fetch_timeout).await {
                Ok(bytes) => match printpdf::image_crate::load_from_memory(&bytes) {
                    Ok(image) => Illustration::Image(image),
                    Err(e) => {
                        warn!("⚠️ Illustration {} could not be decoded: {}", i + 1, e);
                        Illustration::Placeholder(format!("[Could not process illustration: {}]", e))
                    }
                },
                Err(e) => {
                    warn!("⚠️ Illustration {} could not be fetched: {}", i + 1, e);
                    Illustration::Placeholder(format!("[Could not load illustration: {}]", e))
                }
            },
            Some(ImageRef::Failed) => Illustration::Placeholder(PLACEHOLDER_FAILED.to_string()),
            Some(ImageRef::Unset) | None => Illustration::Placeholder(PLACEHOLDER_UNSET.to_string()),
        };
        out.push(illustration);
    }
    out
}

pub fn render_pdf(
    title: &str,
    story: &str,
    scenes: &[Scene],
    illustrations: &[Illustration],
    font_path: Option<&Path>,
) -> Result<Vec<u8>, ExportError> {
    let pages = plan_layout(title, story, scenes, illustrations);

    let (doc, first_page, first_layer) = PdfDocument::new(title, Mm(PAGE_W), Mm(PAGE_H), "Layer 1");
    let fonts = Fonts::load(&doc, font_path)?;

    for (n, page) in pages.iter().enumerate() {
        let layer = if n == 0 {
            doc.get_page(first_page).get_layer(first_layer)
        } else {
            let (p, l) = doc.add_page(Mm(PAGE_W), Mm(PAGE_H), format!("Page {}", n + 1));
            doc.get_page(p).get_layer(l)
        };
        for item in &page.items {
            match item {
                Draw::Text { text, size, font, x, y } => layer.use_text(text.as_str(), *size, Mm(*x), Mm(*y), fonts.get(*font)),
                Draw::Image { scene, x, y, dpi, .. } => {
                    if let Some(Illustration::Image(image)) = illustrations.get(*scene) {
                        Image::from_dynamic_image(image).add_to_layer(
                            layer.clone(),
                            ImageTransform { translate_x: Some(Mm(*x)), translate_y: Some(Mm(*y)), dpi: Some(*dpi), ..Default::default() },
                        );
                    }
                }
            }
        }
    }

    let mut buf: Vec<u8> = Vec::new();
    {
        let mut writer = BufWriter::new(&mut buf);
        doc.save(&mut writer).map_err(|e| ExportError::Pdf(e.to_string()))?;
    }
    Ok(buf)
}

struct Fonts {
    regular: IndirectFontRef,
    bold: IndirectFontRef,
    italic: IndirectFontRef,
}

impl Fonts {
    fn load(doc: &PdfDocumentReference, font_path: Option<&Path>) -> Result<Self, ExportError> {
        if let Some(path) = font_path {
            match File::open(path).map_err(|e| e.to_string()).and_then(|f| doc.add_external_font(f).map_err(|e| e.to_string())) {
                Ok(font) => return Ok(Self { regular: font.clone(), bold: font.clone(), italic: font }),
                Err(e) => warn!("⚠️ Could not load font {}: {}; non-Latin text may not render", path.display(), e),
            }
        } else {
            warn!("⚠️ No STORY_PDF_FONT configured; using builtin Helvetica, non-Latin text may not render");
        }
        let builtin = |f: BuiltinFont| doc.add_builtin_font(f).map_err(|e| ExportError::Font(e.to_string()));
        Ok(Self {
            regular: builtin(BuiltinFont::Helvetica)?,
            bold: builtin(BuiltinFont::HelveticaBold)?,
            italic: builtin(BuiltinFont::HelveticaOblique)?,
        })
    }

    fn get(&self, kind: FontKind) -> &IndirectFontRef {
        match kind {
            FontKind::Regular => &self.regular,
            FontKind::Bold => &self.bold,
            FontKind::Italic => &self.italic,
        }
    }
}

/// Lays every block out on A4 pages and stamps `Page i/n` footers.
pub fn plan_layout(title: &str, story: &str, scenes: &[Scene], illustrations: &[Illustration]) -> Vec<PageLayout> {
    let mut l = Layouter::new();

    l.text(title, 20.0, FontKind::Bold, true);
    l.gap(10.0);
    l.text(story, 12.0, FontKind::Regular, false);
    l.gap(10.0);

    l.new_page();
    l.text(SCENES_HEADING, 16.0, FontKind::Bold, false);
    l.gap(5.0);

    for (i, scene) in scenes.iter().enumerate() {
        l.ensure(SCENE_MIN_SPACE);
        l.text(&format!("{}. {}", i + 1, scene.title), 14.0, FontKind::Bold, false);
        l.gap(2.0);
        l.text(&scene.description, 12.0, FontKind::Regular, false);
        l.gap(5.0);
        match illustrations.get(i) {
            Some(Illustration::Image(image)) => {
                l.ensure(IMAGE_MIN_SPACE);
                l.image(i, image.width(), image.height());
            }
            Some(Illustration::Placeholder(text)) => l.text(text, 10.0, FontKind::Italic, false),
            None => l.text(PLACEHOLDER_UNSET, 10.0, FontKind::Italic, false),
        }
        l.gap(10.0);
    }

    let mut pages = l.finish();
    let total = pages.len();
    for (n, page) in pages.iter_mut().enumerate() {
        let footer = format!("Page {}/{}", n + 1, total);
        let x = centered_x(&footer, 8.0);
        page.items.push(Draw::Text { text: footer, size: 8.0, font: FontKind::Italic, x, y: FOOTER_Y });
    }
    pages
}

struct Layouter {
    pages: Vec<PageLayout>,
    /// Top of the free area on the current page, in mm from the bottom edge.
    y: f32,
}

impl Layouter {
    fn new() -> Self {
        Self { pages: vec![PageLayout::default()], y: PAGE_H - MARGIN }
    }

    fn remaining(&self) -> f32 {
        self.y - MARGIN
    }

    fn new_page(&mut self) {
        self.pages.push(PageLayout::default());
        self.y = PAGE_H - MARGIN;
    }

    fn ensure(&mut self, space: f32) {
        if self.remaining() < space {
            self.new_page();
        }
    }

    fn gap(&mut self, mm: f32) {
        self.y -= mm;
    }

    fn push(&mut self, draw: Draw) {
        if let Some(page) = self.pages.last_mut() {
            page.items.push(draw);
        }
    }

    fn text(&mut self, text: &str, size: f32, font: FontKind, centered: bool) {
        let line_height = size * PT_TO_MM * 1.4;
        for line in wrap_text(text, chars_per_line(size)) {
            if self.remaining() < line_height {
                self.new_page();
            }
            self.y -= line_height;
            if line.is_empty() {
                continue;
            }
            let x = if centered { centered_x(&line, size) } else { MARGIN };
            self.push(Draw::Text { text: line, size, font, x, y: self.y });
        }
    }

    fn image(&mut self, scene: usize, width_px: u32, height_px: u32) {
        if width_px == 0 || height_px == 0 {
            return;
        }
        let max_h = PAGE_H - 2.0 * MARGIN;
        let mut width = CONTENT_W - 10.0;
        let mut height = width * height_px as f32 / width_px as f32;
        if height > max_h {
            width *= max_h / height;
            height = max_h;
        }
        if self.remaining() < height {
            self.new_page();
        }
        self.y -= height;
        let dpi = width_px as f32 * 25.4 / width;
        self.push(Draw::Image { scene, x: MARGIN, y: self.y, width, height, dpi });
        self.y -= 5.0;
    }

    fn finish(self) -> Vec<PageLayout> {
        self.pages
    }
}

fn chars_per_line(size: f32) -> usize {
    (CONTENT_W / (size * PT_TO_MM * 0.5)).floor().max(1.0) as usize
}

fn centered_x(text: &str, size: f32) -> f32 {
    let approx = text.chars().count() as f32 * size * PT_TO_MM * 0.5;
    ((PAGE_W - approx) / 2.0).max(MARGIN)
}

/// Greedy word wrap; blank input lines survive as empty output lines.
pub fn wrap_text(text: &str, max_chars: usize) -> Vec<String> {
    let mut out = Vec::new();
    for raw in text.lines() {
        let mut line = String::new();
        for word in raw.split_whitespace() {
            let mut word: Vec<char> = word.chars().collect();
            while word.len() > max_chars {
                if !line.is_empty() {
                    out.push(std::mem::take(&mut line));
                }
                out.push(word.drain(..max_chars).collect());
            }
            let word: String = word.into_iter().collect();
            if word.is_empty() {
                continue;
            }
            let needed = if line.is_empty() { word.chars().count() } else { line.chars().count() + 1 + word.chars().count() };
            if needed > max_chars {
                out.push(std::mem::take(&mut line));
            }
            if !line.is_empty() {
                line.push(' ');
            }
            line.push_str(&word);
        }
        out.push(line);
    }
    out
}

/// `Last Light.` becomes `last_light_story.pdf`.
pub fn pdf_file_name(title: &str) -> String {
    format!("{}_story.pdf", title.replace(' ', "_").replace('.', "").to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::Outline,
        testing::{self, MockFetcher, MockImages, MockSpeech, MockText},
    };
    use pretty_assertions::assert_eq;

    fn placeholders(n: usize) -> Vec<Illustration> {
        (0..n).map(|_| Illustration::Placeholder(PLACEHOLDER_FAILED.to_string())).collect()
    }

    fn all_texts(pages: &[PageLayout]) -> Vec<String> {
        pages.iter().flat_map(|p| p.texts().map(str::to_string).collect::<Vec<_>>()).collect()
    }

    #[test]
    fn wrap_keeps_words_within_limit() {
        let lines = wrap_text("the keeper climbed the long spiral stair", 12);
        assert_eq!(lines, vec!["the keeper", "climbed the", "long spiral", "stair"]);
        assert!(lines.iter().all(|l| l.chars().count() <= 12));
    }

    #[test]
    fn wrap_splits_overlong_words_and_keeps_blank_lines() {
        assert_eq!(wrap_text("abcdefghij", 4), vec!["abcd", "efgh", "ij"]);
        assert_eq!(wrap_text("one\n\ntwo", 10), vec!["one", "", "two"]);
    }

    #[test]
    fn title_appears_once_at_the_top() {
        let pages = plan_layout("Last Light", "Story.", &testing::scenes(5), &placeholders(5));
        let texts = all_texts(&pages);
        assert_eq!(pages[0].texts().next(), Some("Last Light"));
        assert_eq!(texts.iter().filter(|t| t.as_str() == "Last Light").count(), 1);
    }

    #[test]
    fn scenes_follow_in_order_with_placeholders() {
        let pages = plan_layout("T", "Story.", &testing::scenes(6), &placeholders(6));
        let texts = all_texts(&pages);
        let positions: Vec<usize> = (1..=6)
            .map(|i| texts.iter().position(|t| t == &format!("{i}. Scene {i}")).unwrap())
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(texts.iter().filter(|t| t.as_str() == PLACEHOLDER_FAILED).count(), 6);
    }

    #[test]
    fn missing_trailing_illustrations_render_as_unset() {
        let pages = plan_layout("T", "Story.", &testing::scenes(5), &placeholders(2));
        let texts = all_texts(&pages);
        assert_eq!(texts.iter().filter(|t| t.as_str() == PLACEHOLDER_UNSET).count(), 3);
    }

    #[test]
    fn every_page_is_numbered() {
        let long_story = "The sea was loud that night. ".repeat(400);
        let pages = plan_layout("T", &long_story, &testing::scenes(7), &placeholders(7));
        let total = pages.len();
        assert!(total > 2);
        for (n, page) in pages.iter().enumerate() {
            assert_eq!(page.texts().last(), Some(format!("Page {}/{}", n + 1, total).as_str()));
        }
    }

    #[test]
    fn images_are_scaled_to_content_width_and_stay_on_page() {
        let mut illustrations = placeholders(5);
        illustrations[0] = Illustration::Image(DynamicImage::new_rgb8(1024, 1024));
        illustrations[1] = Illustration::Image(DynamicImage::new_rgb8(100, 1000));
        let pages = plan_layout("T", "Story.", &testing::scenes(5), &illustrations);
        let images: Vec<&Draw> = pages.iter().flat_map(|p| p.items.iter()).filter(|d| matches!(d, Draw::Image { .. })).collect();
        assert_eq!(images.len(), 2);
        for draw in images {
            let Draw::Image { y, width, height, .. } = draw else { unreachable!() };
            assert!(*width <= CONTENT_W);
            assert!(*y >= MARGIN - 0.01);
            assert!(*y + *height <= PAGE_H - MARGIN + 0.01);
        }
    }

    #[test]
    fn render_without_illustrations_produces_a_pdf() {
        let pdf = render_pdf("Last Light", "Story.\n\nMore story.", &testing::scenes(5), &placeholders(5), None).unwrap();
        assert!(pdf.starts_with(b"%PDF"));
    }

    #[test]
    fn render_embeds_decoded_images() {
        let mut illustrations = placeholders(5);
        illustrations[2] = Illustration::Image(DynamicImage::new_rgb8(8, 6));
        let pdf = render_pdf("T", "Story.", &testing::scenes(5), &illustrations, None).unwrap();
        assert!(pdf.starts_with(b"%PDF"));
    }

    #[test]
    fn unreadable_font_falls_back_to_builtin() {
        let pdf = render_pdf("T", "Story.", &testing::scenes(5), &placeholders(5), Some(Path::new("/nonexistent/font.ttf"))).unwrap();
        assert!(pdf.starts_with(b"%PDF"));
    }

    #[tokio::test]
    async fn export_survives_zero_successful_illustrations() {
        let fetcher = MockFetcher::default();
        let services = testing::services_with(MockText::default(), MockImages::always_ok(), MockSpeech::ok(b""), fetcher.clone());
        let session = Session {
            stage: Stage::Complete,
            outline: Some(Outline { title: "Last Light".into(), summary: "s".into() }),
            scenes: Some(testing::scenes(5)),
            story_text: Some("The whole story.".into()),
            illustrations: Some(vec![
                ImageRef::Resolved("https://images.test/0.png".into()),
                ImageRef::Failed,
                ImageRef::Failed,
                ImageRef::Unset,
            ]),
            ..Session::default()
        };

        let illustrations = resolve_illustrations(5, session.illustrations.as_deref().unwrap(), &services).await;
        let texts = all_texts(&plan_layout("Last Light", "The whole story.", session.scenes.as_deref().unwrap(), &illustrations));
        assert!(texts.iter().any(|t| t.starts_with("[Could not load illustration")));
        assert!(texts.iter().any(|t| t == "The whole story."));
        assert_eq!(texts.iter().filter(|t| t.as_str() == PLACEHOLDER_UNSET).count(), 2);

        let pdf = export_pdf(&session, &services).await.unwrap();
        assert!(pdf.starts_with(b"%PDF"));
        assert_eq!(fetcher.fetched(), vec!["https://images.test/0.png"; 2]);
    }

    #[tokio::test]
    async fn export_requires_a_story() {
        let services = testing::services(MockText::default(), MockImages::always_ok());
        let session = Session { outline: Some(Outline { title: "T".into(), summary: "s".into() }), scenes: Some(testing::scenes(5)), ..Session::default() };
        assert!(matches!(export_pdf(&session, &services).await, Err(WorkflowError::MissingPrerequisite { missing: "story_text", .. })));
    }

    #[test]
    fn file_name_follows_title() {
        assert_eq!(pdf_file_name("Last Light. A Tale"), "last_light_a_tale_story.pdf");
    }
}

//! Draws a display root's top-level windows into a ratatui buffer.
//!
//! Each visible top-level becomes a bordered [`Block`] titled with its
//! `prop:name` property, painted bottom to top so stacking order shows. The
//! server coordinates are clipped to the cells that exist on screen.

use ratatui::buffer::Buffer;
use ratatui::layout::Rect as CellRect;
use ratatui::style::{Color, Modifier, Style};
use ratatui::widgets::{Block, Borders, Clear, Paragraph, Widget};

use crate::geometry::Rect;
use crate::ids::WindowId;
use crate::properties::NAME;
use crate::service::WindowService;

const UNTITLED: &str = "window";

fn focused_border() -> Style {
    Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
}

/// The part of `bounds` that lands inside `area`, or `None` when nothing
/// does.
pub fn clip_to_cells(bounds: Rect, area: CellRect) -> Option<CellRect> {
    let left = i64::from(bounds.x).max(i64::from(area.x));
    let top = i64::from(bounds.y).max(i64::from(area.y));
    let right = (i64::from(bounds.x) + i64::from(bounds.width)).min(i64::from(area.right()));
    let bottom = (i64::from(bounds.y) + i64::from(bounds.height)).min(i64::from(area.bottom()));
    if right <= left || bottom <= top {
        return None;
    }
    Some(CellRect::new(
        u16::try_from(left).ok()?,
        u16::try_from(top).ok()?,
        u16::try_from(right - left).ok()?,
        u16::try_from(bottom - top).ok()?,
    ))
}

/// The window's name, or a placeholder when it has none or it is not UTF-8.
pub fn window_title(service: &WindowService, window: WindowId) -> &str {
    service
        .hierarchy()
        .properties(window)
        .and_then(|props| props.get(NAME))
        .and_then(|bytes| std::str::from_utf8(bytes).ok())
        .unwrap_or(UNTITLED)
}

/// Paints every visible child of `root` into `buf`, restricted to `area`.
pub fn render_windows(service: &WindowService, root: WindowId, area: CellRect, buf: &mut Buffer) {
    let hierarchy = service.hierarchy();
    let focused = service.focused_window();
    for &window in hierarchy.children(root) {
        let Some(node) = hierarchy.get(window) else {
            continue;
        };
        if !node.visible() {
            continue;
        }
        let Some(cells) = clip_to_cells(node.bounds(), area) else {
            continue;
        };
        let mut block = Block::default()
            .borders(Borders::ALL)
            .title(window_title(service, window));
        if focused == Some(window) {
            block = block.border_style(focused_border());
        }
        Clear.render(cells, buf);
        block.render(cells, buf);
    }
}

/// One line of text across the bottom row of `area`.
pub fn render_status(status: &str, area: CellRect, buf: &mut Buffer) {
    if area.height == 0 {
        return;
    }
    let row = CellRect::new(area.x, area.bottom() - 1, area.width, 1);
    Paragraph::new(status)
        .style(Style::default().add_modifier(Modifier::REVERSED))
        .render(row, buf);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServiceConfig;
    use crate::testing::TestSetup;

    fn row_text(buffer: &Buffer, y: u16) -> String {
        let area = buffer.area;
        (0..area.width)
            .filter_map(|x| buffer.cell((x, y)).map(|cell| cell.symbol().to_string()))
            .collect()
    }

    fn named(t: &mut TestSetup, window: WindowId, name: &str) {
        assert!(t
            .service
            .set_local_property(window, NAME, Some(name.as_bytes().to_vec())));
    }

    #[test]
    fn clipping_keeps_only_on_screen_cells() {
        let area = CellRect::new(0, 0, 80, 24);
        assert_eq!(
            clip_to_cells(Rect::new(-5, 2, 10, 4), area),
            Some(CellRect::new(0, 2, 5, 4))
        );
        assert_eq!(
            clip_to_cells(Rect::new(75, 20, 10, 10), area),
            Some(CellRect::new(75, 20, 5, 4))
        );
        assert_eq!(clip_to_cells(Rect::new(-20, 0, 10, 10), area), None);
        assert_eq!(clip_to_cells(Rect::new(70_000, 0, 10, 10), area), None);
        assert_eq!(clip_to_cells(Rect::new(i32::MAX - 1, 0, 10, 10), area), None);
    }

    #[test]
    fn windows_render_as_titled_blocks() {
        let mut t = TestSetup::with_config(ServiceConfig::default().with_display(Rect::new(0, 0, 40, 12)));
        let top = t.new_top_level(1, Rect::new(2, 1, 20, 5)).unwrap();
        named(&mut t, top, "editor");

        let area = CellRect::new(0, 0, 40, 12);
        let mut buffer = Buffer::empty(area);
        render_windows(&t.service, t.root(), area, &mut buffer);

        assert!(row_text(&buffer, 1).contains("editor"));
        assert_eq!(buffer.cell((2, 1)).map(|c| c.symbol().to_string()), Some("┌".to_string()));
        assert_eq!(buffer.cell((21, 5)).map(|c| c.symbol().to_string()), Some("┘".to_string()));
        assert!(row_text(&buffer, 0).trim().is_empty());
    }

    #[test]
    fn narrow_windows_with_wide_titles_do_not_panic() {
        let mut t = TestSetup::with_config(ServiceConfig::default().with_display(Rect::new(0, 0, 20, 6)));
        let top = t.new_top_level(1, Rect::new(0, 0, 3, 3)).unwrap();
        named(&mut t, top, "é日本");

        let area = CellRect::new(0, 0, 20, 6);
        let mut buffer = Buffer::empty(area);
        render_windows(&t.service, t.root(), area, &mut buffer);
        assert_eq!(buffer.cell((0, 0)).map(|c| c.symbol().to_string()), Some("┌".to_string()));
    }

    #[test]
    fn hidden_windows_are_skipped_and_focus_is_highlighted() {
        let mut t = TestSetup::with_config(ServiceConfig::default().with_display(Rect::new(0, 0, 40, 12)));
        let shown = t.new_top_level(1, Rect::new(0, 0, 10, 4)).unwrap();
        let hidden = t.new_top_level(2, Rect::new(20, 0, 10, 4)).unwrap();
        assert!(t.service.set_local_visibility(hidden, false));
        assert!(t.service.set_local_focus(Some(shown)));

        let area = CellRect::new(0, 0, 40, 12);
        let mut buffer = Buffer::empty(area);
        render_windows(&t.service, t.root(), area, &mut buffer);

        assert_eq!(buffer.cell((20, 0)).map(|c| c.symbol().to_string()), Some(" ".to_string()));
        assert_eq!(buffer.cell((0, 0)).map(|c| c.fg), Some(Color::Yellow));
    }

    #[test]
    fn status_fills_the_bottom_row() {
        let area = CellRect::new(0, 0, 30, 4);
        let mut buffer = Buffer::empty(area);
        render_status("q quits", area, &mut buffer);
        assert!(row_text(&buffer, 3).starts_with("q quits"));
        assert!(row_text(&buffer, 2).trim().is_empty());
    }
}

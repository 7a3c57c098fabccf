use ratatui::{
    Frame,
    layout::{Constraint, Flex, Layout, Rect},
    style::{Style, Stylize},
    symbols::border,
    text::Line,
    widgets::{Block, Cell, Clear, Paragraph, Row, Table, TableState},
};

use crate::model::{Model, UIData};

pub const STATUSLINE_HEIGHT: u16 = 1;
pub const COLUMN_SPACING: u16 = 1;

#[derive(Debug, Default)]
pub struct TableUI {
    table_state: TableState,
}

impl TableUI {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn draw(&mut self, model: &Model, frame: &mut Frame) {
        let uidata = model.get_uidata();
        let [table_area, status_area] = Layout::vertical([
            Constraint::Min(1),
            Constraint::Length(STATUSLINE_HEIGHT),
        ])
        .areas(frame.area());

        self.render_table(uidata, frame, table_area);
        Self::render_statusline(uidata, frame, status_area);
        if uidata.show_popup {
            Self::render_popup(uidata, frame);
        }
    }

    fn render_table(&mut self, uidata: &UIData, frame: &mut Frame, area: Rect) {
        let title = Line::from(format!(" {} ", uidata.name).bold());
        let page = Line::from(vec![
            " Page ".into(),
            format!("{}/{}", uidata.current_page, uidata.total_pages)
                .yellow()
                .bold(),
            format!(" ({} records) ", uidata.record_count).into(),
        ]);
        let instructions = Line::from(vec![
            " Prev ".into(),
            "<p>".blue().bold(),
            " Next ".into(),
            "<n>".blue().bold(),
            " Help ".into(),
            "<?>".blue().bold(),
            " Quit ".into(),
            "<q> ".blue().bold(),
        ]);
        let block = Block::bordered()
            .title(title.centered())
            .title_bottom(instructions.left_aligned())
            .title_bottom(page.right_aligned())
            .border_set(border::THICK);

        if uidata.nrows == 0 {
            let text = if uidata.loading {
                "Loading ..."
            } else {
                "No records"
            };
            frame.render_widget(Paragraph::new(text).centered().block(block), area);
            return;
        }

        let header = Row::new(uidata.columns.iter().map(|c| Cell::from(c.name.clone())))
            .style(Style::new().bold().underlined());
        let rows = (0..uidata.nrows).map(|ridx| {
            Row::new(
                uidata
                    .columns
                    .iter()
                    .map(|c| Cell::from(c.data.get(ridx).cloned().unwrap_or_default())),
            )
        });
        let widths = uidata
            .columns
            .iter()
            .map(|c| Constraint::Length(u16::try_from(c.width).unwrap_or(u16::MAX)));

        let table = Table::new(rows, widths)
            .header(header)
            .column_spacing(COLUMN_SPACING)
            .row_highlight_style(Style::new().reversed())
            .block(block);

        self.table_state.select(Some(uidata.selected_row));
        frame.render_stateful_widget(table, area, &mut self.table_state);
    }

    fn render_statusline(uidata: &UIData, frame: &mut Frame, area: Rect) {
        let line = Line::from(uidata.status_message.clone().yellow());
        frame.render_widget(Paragraph::new(line), area);
    }

    fn render_popup(uidata: &UIData, frame: &mut Frame) {
        let lines: Vec<Line> = uidata
            .popup_message
            .lines()
            .map(|l| Line::from(l.to_string()))
            .collect();
        let content_width = lines.iter().map(Line::width).max().unwrap_or(0);
        let width = u16::try_from(content_width + 4).unwrap_or(u16::MAX);
        let height = u16::try_from(lines.len() + 2).unwrap_or(u16::MAX);

        let area = popup_area(frame.area(), width, height);
        let popup = Paragraph::new(lines).block(
            Block::bordered()
                .title(Line::from(" Help ".bold()).centered())
                .border_set(border::ROUNDED),
        );
        frame.render_widget(Clear, area);
        frame.render_widget(popup, area);
    }
}

fn popup_area(area: Rect, width: u16, height: u16) -> Rect {
    let [area] = Layout::vertical([Constraint::Length(height)])
        .flex(Flex::Center)
        .areas(area);
    let [area] = Layout::horizontal([Constraint::Length(width)])
        .flex(Flex::Center)
        .areas(area);
    area
}

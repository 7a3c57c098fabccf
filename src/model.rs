use std::sync::Arc;
use std::time::Instant;

use arboard::Clipboard;
use tracing::{debug, error, info, trace};

use crate::domain::{HELP_TEXT, Message, PVConfig, PVError, Record};
use crate::fetcher::{DataFetcher, TableSource};
use crate::pager::Pager;
use crate::table::{ColumnView, build_columns, column_names};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    EMPTY,
    LOADING,
    READY,
    QUITTING,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Modus {
    TABLE,
    POPUP,
}

/// Everything the UI needs to render one frame.
pub struct UIData {
    pub name: String,
    pub columns: Vec<ColumnView>,
    pub nrows: usize,
    pub record_count: usize,
    pub selected_row: usize,
    pub current_page: usize,
    pub total_pages: usize,
    pub loading: bool,
    pub show_popup: bool,
    pub popup_message: String,
    pub status_message: String,
}

impl UIData {
    pub fn empty() -> Self {
        UIData {
            name: String::new(),
            columns: Vec::new(),
            nrows: 0,
            record_count: 0,
            selected_row: 0,
            current_page: 1,
            total_pages: 0,
            loading: false,
            show_popup: false,
            popup_message: String::new(),
            status_message: String::new(),
        }
    }
}

pub struct Model {
    config: PVConfig,
    pub status: Status,
    modus: Modus,
    pager: Pager,
    fetcher: DataFetcher,
    columns: Vec<String>,
    selected_row: usize,
    initial_fetch_pending: bool,
    uidata: UIData,
    clipboard: Option<Clipboard>,
    status_message: String,
}

impl Model {
    /// The initial fetch is not issued here but on the first `update`, after the first frame was drawn.
    pub fn init(config: &PVConfig, source: Arc<dyn TableSource>) -> Self {
        let mut model = Self {
            config: config.clone(),
            status: Status::EMPTY,
            modus: Modus::TABLE,
            pager: Pager::new(config.pager),
            fetcher: DataFetcher::new(source),
            columns: Vec::new(),
            selected_row: 0,
            initial_fetch_pending: true,
            uidata: UIData::empty(),
            clipboard: None,
            status_message: "Started ptv!".to_string(),
        };
        model.update_table_data();
        model
    }

    pub fn update(&mut self, message: Option<Message>) -> Result<(), PVError> {
        if self.initial_fetch_pending {
            self.initial_fetch_pending = false;
            self.refresh();
        }
        self.poll_fetcher();

        if let Some(msg) = message {
            trace!("Update: Modus {:?}, Message {:?}", self.modus, msg);
            match self.modus {
                Modus::TABLE => match msg {
                    Message::Quit => self.quit(),
                    Message::NextPage => self.next_page(),
                    Message::PrevPage => self.prev_page(),
                    Message::MoveDown => self.move_selection_down(),
                    Message::MoveUp => self.move_selection_up(),
                    Message::Refresh => self.refresh(),
                    Message::CopyRecord => self.copy_selected_record(),
                    Message::Help => self.show_help(),
                    Message::Exit => {}
                },
                Modus::POPUP => match msg {
                    Message::Quit => self.quit(),
                    Message::Exit | Message::Help => self.close_popup(),
                    _ => (),
                },
            }
        }
        Ok(())
    }

    /// Current visible slice.
    pub fn products(&self) -> &[Record] {
        self.pager.visible_slice()
    }

    pub fn current_page(&self) -> usize {
        self.pager.current_page()
    }

    pub fn total_pages(&self) -> usize {
        self.pager.total_pages()
    }

    pub fn get_uidata(&self) -> &UIData {
        &self.uidata
    }

    pub fn quit(&mut self) {
        self.status = Status::QUITTING;
    }

    // -------------------- Fetch handling ---------------------- //

    fn refresh(&mut self) {
        match self.fetcher.request(&self.config.table, &self.config.filter) {
            Ok(request_id) => {
                debug!("Refreshing {} (request {request_id})", self.config.table);
                self.status = Status::LOADING;
                self.set_status_message(format!("Loading {} ...", self.config.table));
            }
            Err(e) => {
                error!("Could not request {}: {e}", self.config.table);
                if !self.fetcher.is_pending() {
                    self.status = self.settled_status();
                }
                self.set_status_message(format!("Error fetching {}: {e}", self.config.table));
            }
        }
        self.update_table_data();
    }

    fn poll_fetcher(&mut self) {
        match self.fetcher.poll() {
            Some(Ok(records)) => self.load_records(records),
            Some(Err(e)) => {
                error!(
                    "Error fetching {} (request {}): {e}",
                    self.config.table,
                    self.fetcher.latest_request()
                );
                self.status = self.settled_status();
                self.set_status_message(format!("Error fetching {}: {e}", self.config.table));
                self.update_table_data();
            }
            None => {}
        }
    }

    fn load_records(&mut self, records: Vec<Record>) {
        let start_time = Instant::now();
        self.pager.load(records);
        self.columns = column_names(self.pager.records());
        self.selected_row = self.clamped_row(self.selected_row);
        self.status = self.settled_status();
        info!(
            "Loaded {} records into {} pages of {} in {}ms",
            self.pager.len(),
            self.pager.total_pages(),
            self.pager.page_size(),
            start_time.elapsed().as_millis()
        );
        self.set_status_message(format!("Loaded {} records", self.pager.len()));
        self.update_table_data();
    }

    fn settled_status(&self) -> Status {
        if self.pager.is_empty() {
            Status::EMPTY
        } else {
            Status::READY
        }
    }

    // -------------------- Navigation ---------------------- //

    fn next_page(&mut self) {
        if self.pager.next_page() {
            self.selected_row = 0;
            self.update_table_data();
        }
    }

    fn prev_page(&mut self) {
        if self.pager.prev_page() {
            self.selected_row = 0;
            self.update_table_data();
        }
    }

    fn move_selection_down(&mut self) {
        self.selected_row = self.clamped_row(self.selected_row + 1);
        self.update_table_data();
    }

    fn move_selection_up(&mut self) {
        self.selected_row = self.selected_row.saturating_sub(1);
        self.update_table_data();
    }

    fn clamped_row(&self, row: usize) -> usize {
        let visible = self.pager.visible_slice().len();
        std::cmp::min(row, visible.saturating_sub(1))
    }

    // -------------------- Popup & clipboard ---------------------- //

    fn show_help(&mut self) {
        self.modus = Modus::POPUP;
        self.uidata.popup_message = HELP_TEXT.to_string();
        self.uidata.show_popup = true;
    }

    fn close_popup(&mut self) {
        trace!("Close popup ...");
        self.modus = Modus::TABLE;
        self.uidata.show_popup = false;
    }

    fn copy_selected_record(&mut self) {
        let Some(record) = self.pager.visible_slice().get(self.selected_row) else {
            return;
        };
        let content = match serde_json::to_string(record) {
            Ok(content) => content,
            Err(e) => {
                error!("Failed to serialize record: {e}");
                return;
            }
        };

        if self.clipboard.is_none() {
            match Clipboard::new() {
                Ok(clipboard) => self.clipboard = Some(clipboard),
                Err(e) => {
                    error!("Clipboard not available: {e:?}");
                    self.set_status_message("Clipboard not available!");
                    return;
                }
            }
        }
        let copied = self.clipboard.as_mut().map(|c| c.set_text(content));
        match copied {
            Some(Ok(_)) => {
                trace!("Copied record to clipboard.");
                self.set_status_message("Copied record to clipboard");
            }
            Some(Err(e)) => trace!("Error copying to clipboard: {:?}", e),
            None => {}
        }
    }

    // -------------------- UI data ---------------------- //

    fn set_status_message(&mut self, message: impl Into<String>) {
        self.status_message = message.into();
        self.uidata.status_message = self.status_message.clone();
    }

    fn update_table_data(&mut self) {
        let products = self.products();
        let columns = build_columns(&self.columns, products, self.config.max_column_width);
        let nrows = products.len();
        trace!(
            "Table: page {}/{}, rows {}, selected {}",
            self.current_page(),
            self.total_pages(),
            nrows,
            self.selected_row
        );

        self.uidata = UIData {
            name: self.config.table.clone(),
            columns,
            nrows,
            record_count: self.pager.len(),
            selected_row: self.selected_row,
            current_page: self.current_page(),
            total_pages: self.total_pages(),
            loading: self.fetcher.is_pending(),
            show_popup: self.modus == Modus::POPUP,
            popup_message: self.uidata.popup_message.clone(),
            status_message: self.status_message.clone(),
        };
    }
}

#[cfg(test)]
mod tests {
    use std::thread;
    use std::time::Duration;

    use super::*;
    use crate::fetcher::testing::StaticSource;

    fn settle(model: &mut Model) {
        model.update(None).expect("update");
        for _ in 0..1000 {
            if !model.fetcher.is_pending() {
                return;
            }
            thread::sleep(Duration::from_millis(5));
            model.update(None).expect("update");
        }
        panic!("fetch did not finish");
    }

    fn loaded_model(n: usize) -> Model {
        let mut model = Model::init(&PVConfig::default(), Arc::new(StaticSource::products(n)));
        settle(&mut model);
        model
    }

    fn ids(model: &Model) -> Vec<u64> {
        model
            .products()
            .iter()
            .filter_map(|p| p["id"].as_u64())
            .collect()
    }

    #[test]
    fn initial_fetch_waits_for_first_update() {
        let source = Arc::new(StaticSource::products(3));
        let mut model = Model::init(&PVConfig::default(), source.clone());
        assert!(source.calls.lock().unwrap().is_empty());
        assert_eq!(model.status, Status::EMPTY);

        model.update(None).expect("update");
        assert_eq!(model.fetcher.latest_request(), 1);

        settle(&mut model);
        assert_eq!(model.status, Status::READY);
        assert_eq!(source.calls.lock().unwrap().len(), 1);
    }

    #[test]
    fn pages_through_fetched_products() {
        let mut model = loaded_model(25);
        assert_eq!(model.total_pages(), 3);
        assert_eq!(ids(&model), (1..=10).collect::<Vec<_>>());

        model.update(Some(Message::NextPage)).unwrap();
        model.update(Some(Message::NextPage)).unwrap();
        model.update(Some(Message::NextPage)).unwrap();
        assert_eq!(model.current_page(), 3);
        assert_eq!(ids(&model), (21..=25).collect::<Vec<_>>());

        let uidata = model.get_uidata();
        assert_eq!(uidata.nrows, 5);
        assert_eq!(uidata.record_count, 25);
        assert_eq!((uidata.current_page, uidata.total_pages), (3, 3));
        assert_eq!(uidata.columns[0].name, "id");
        assert_eq!(uidata.columns[0].data[0], "21");

        model.update(Some(Message::PrevPage)).unwrap();
        assert_eq!(ids(&model), (11..=20).collect::<Vec<_>>());
    }

    #[test]
    fn failed_fetch_leaves_records_untouched() {
        let mut model = Model::init(
            &PVConfig::default(),
            Arc::new(StaticSource::failing("connection refused")),
        );
        settle(&mut model);

        assert!(model.products().is_empty());
        assert_eq!(model.total_pages(), 0);
        assert_eq!(model.status, Status::EMPTY);
        assert!(model.get_uidata().status_message.contains("connection refused"));

        model.update(Some(Message::NextPage)).unwrap();
        model.update(Some(Message::PrevPage)).unwrap();
        assert_eq!(model.current_page(), 1);
    }

    #[test]
    fn failed_refresh_keeps_loaded_page() {
        let source = Arc::new(StaticSource::products(25));
        let mut model = Model::init(&PVConfig::default(), source.clone());
        settle(&mut model);
        model.update(Some(Message::NextPage)).unwrap();

        source.fail_with("down");
        model.update(Some(Message::Refresh)).unwrap();
        settle(&mut model);

        assert_eq!(source.calls.lock().unwrap().len(), 2);
        assert_eq!(model.pager.len(), 25);
        assert_eq!(model.current_page(), 2);
        assert_eq!(ids(&model), (11..=20).collect::<Vec<_>>());
        assert_eq!(model.status, Status::READY);
        let uidata = model.get_uidata();
        assert_eq!(uidata.nrows, 10);
        assert!(!uidata.loading);
        assert!(uidata.status_message.contains("down"), "{}", uidata.status_message);
    }

    #[test]
    fn rejected_request_is_not_fatal() {
        let source = Arc::new(StaticSource::products(3));
        let mut model = Model::init(&PVConfig::default().with_table(""), source.clone());

        model.update(None).expect("update");
        model.update(Some(Message::Refresh)).expect("refresh");

        assert!(source.calls.lock().unwrap().is_empty());
        assert_eq!(model.status, Status::EMPTY);
        assert!(!model.get_uidata().loading);
        assert!(
            model.get_uidata().status_message.contains("must not be empty"),
            "{}",
            model.get_uidata().status_message
        );
    }

    #[test]
    fn refresh_keeps_current_page() {
        let mut model = loaded_model(25);
        model.update(Some(Message::NextPage)).unwrap();

        model.update(Some(Message::Refresh)).unwrap();
        assert_eq!(model.status, Status::LOADING);
        settle(&mut model);

        assert_eq!(model.status, Status::READY);
        assert_eq!(model.current_page(), 2);
        assert_eq!(ids(&model), (11..=20).collect::<Vec<_>>());
    }

    #[test]
    fn selection_stays_inside_the_page() {
        let mut model = loaded_model(12);
        model.update(Some(Message::MoveUp)).unwrap();
        assert_eq!(model.get_uidata().selected_row, 0);

        for _ in 0..15 {
            model.update(Some(Message::MoveDown)).unwrap();
        }
        assert_eq!(model.get_uidata().selected_row, 9);

        model.update(Some(Message::NextPage)).unwrap();
        assert_eq!(model.get_uidata().selected_row, 0);
        model.update(Some(Message::MoveDown)).unwrap();
        model.update(Some(Message::MoveDown)).unwrap();
        assert_eq!(model.get_uidata().selected_row, 1);
    }

    #[test]
    fn help_popup_swallows_navigation() {
        let mut model = loaded_model(25);
        model.update(Some(Message::Help)).unwrap();
        assert!(model.get_uidata().show_popup);

        model.update(Some(Message::NextPage)).unwrap();
        assert_eq!(model.current_page(), 1);

        model.update(Some(Message::Exit)).unwrap();
        assert!(!model.get_uidata().show_popup);
        model.update(Some(Message::NextPage)).unwrap();
        assert_eq!(model.current_page(), 2);

        model.update(Some(Message::Quit)).unwrap();
        assert_eq!(model.status, Status::QUITTING);
    }
}

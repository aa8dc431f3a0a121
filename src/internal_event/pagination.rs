use metrics::{counter, histogram};

use super::InternalEvent;

#[derive(Debug)]
pub struct PagesPlanned<'a> {
    pub collection: &'a str,
    pub count: u64,
    pub pages: u64,
}

impl InternalEvent for PagesPlanned<'_> {
    fn emit(self) {
        histogram!("pager_pages_planned").record(self.pages as f64);
        debug!(
            target: "pagination::stats",
            collection = self.collection,
            count = self.count,
            pages = self.pages,
            "Count for collection fetched."
        );
    }
}

#[derive(Debug)]
pub struct CollectionAssembled<'a> {
    pub collection: &'a str,
    pub items: usize,
}

impl InternalEvent for CollectionAssembled<'_> {
    fn emit(self) {
        counter!("pager_items_collected_total").increment(self.items as u64);
        debug!(
            target: "pagination::stats",
            collection = self.collection,
            items = self.items,
            "Collection assembled."
        );
    }
}

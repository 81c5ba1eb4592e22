use serde::Serialize;

/// One page of a list, with the metadata a feed page needs to render
/// navigation links.
#[derive(Serialize, Debug, Clone)]
pub struct Page<T> {
    pub object_list: Vec<T>,
    pub number: usize,
    pub num_pages: usize,
    pub count: usize,
    pub per_page: usize,
    pub has_next: bool,
    pub has_previous: bool,
    pub next_page_number: Option<usize>,
    pub previous_page_number: Option<usize>,
}

impl<T> Page<T> {
    /// Replaces the page's objects (e.g. records with their display form),
    /// keeping the navigation metadata.
    pub fn try_map_objects<U, E>(
        self,
        f: impl FnOnce(Vec<T>) -> Result<Vec<U>, E>,
    ) -> Result<Page<U>, E> {
        Ok(Page {
            object_list: f(self.object_list)?,
            number: self.number,
            num_pages: self.num_pages,
            count: self.count,
            per_page: self.per_page,
            has_next: self.has_next,
            has_previous: self.has_previous,
            next_page_number: self.next_page_number,
            previous_page_number: self.previous_page_number,
        })
    }
}

pub struct Paginator {
    count: usize,
    per_page: usize,
}

impl Paginator {
    pub fn new(count: usize, per_page: usize) -> Self {
        Self {
            count,
            per_page: per_page.max(1),
        }
    }

    /// An empty list still has one (empty) page.
    pub fn num_pages(&self) -> usize {
        if self.count == 0 {
            1
        } else {
            (self.count + self.per_page - 1) / self.per_page
        }
    }

    /// Missing or non-numeric input selects the first page; anything out of
    /// range (including zero and negatives) selects the last one.
    pub fn page_number(&self, raw: Option<&str>) -> usize {
        let last = self.num_pages();
        let raw = match raw.map(str::trim) {
            Some(raw) => raw,
            None => return 1,
        };
        match raw.parse::<i64>() {
            Ok(n) if n < 1 || n as u64 > last as u64 => last,
            Ok(n) => n as usize,
            // an integer too large for i64 is still out of range
            Err(_) if is_integer(raw) => last,
            Err(_) => 1,
        }
    }

    /// Slice `items` (already ordered) into the requested page.
    pub fn get_page<T>(&self, items: Vec<T>, raw: Option<&str>) -> Page<T> {
        let number = self.page_number(raw);
        let num_pages = self.num_pages();
        let start = (number - 1) * self.per_page;
        let object_list: Vec<T> = items.into_iter().skip(start).take(self.per_page).collect();

        Page {
            object_list,
            number,
            num_pages,
            count: self.count,
            per_page: self.per_page,
            has_next: number < num_pages,
            has_previous: number > 1,
            next_page_number: (number < num_pages).then(|| number + 1),
            previous_page_number: (number > 1).then(|| number - 1),
        }
    }
}

fn is_integer(raw: &str) -> bool {
    let digits = raw.strip_prefix(['-', '+']).unwrap_or(raw);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

pub fn paginate<T>(items: Vec<T>, per_page: usize, raw: Option<&str>) -> Page<T> {
    Paginator::new(items.len(), per_page).get_page(items, raw)
}

//! Page range selection.

/// Pages chosen on the command line, one-based as typed by users.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PageSelection {
    #[default]
    All,
    /// Inclusive one-based ranges; a single page is a range of one.
    Ranges(Vec<(usize, usize)>),
}

impl PageSelection {
    /// Parse a selection like `"all"`, `"3"`, `"1-10"` or `"1,3,5-7"`.
    pub fn parse(s: &str) -> Result<Self, String> {
        let s = s.trim();
        if s.is_empty() || s == "all" {
            return Ok(PageSelection::All);
        }

        let mut ranges = Vec::new();
        for part in s.split(',') {
            let part = part.trim();
            if let Some((start, end)) = part.split_once('-') {
                let start = page_number(start)?;
                let end = page_number(end)?;
                if start > end {
                    return Err(format!("Invalid page range: {}", part));
                }
                ranges.push((start, end));
            } else {
                let page = page_number(part)?;
                ranges.push((page, page));
            }
        }

        Ok(PageSelection::Ranges(ranges))
    }

    /// Zero-based indices of the selected pages that exist, sorted and
    /// without duplicates.
    pub fn indices(&self, page_count: usize) -> Vec<usize> {
        match self {
            PageSelection::All => (0..page_count).collect(),
            PageSelection::Ranges(ranges) => {
                let mut indices: Vec<usize> = ranges
                    .iter()
                    .filter(|(start, _)| *start <= page_count)
                    .flat_map(|&(start, end)| start - 1..end.min(page_count))
                    .collect();
                indices.sort_unstable();
                indices.dedup();
                indices
            }
        }
    }
}

fn page_number(s: &str) -> Result<usize, String> {
    match s.trim().parse::<usize>() {
        Ok(0) | Err(_) => Err(format!("Invalid page number: {}", s.trim())),
        Ok(n) => Ok(n),
    }
}

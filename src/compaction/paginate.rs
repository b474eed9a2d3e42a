use crate::core::LocationHistory;

/// Splits `history` into pages of at most `max_count` samples.
///
/// The first page holds at most `max_count - prev_count` samples so that it can
/// top up an existing segment that already holds `prev_count`. When everything
/// fits in that first page the input is returned as is. Each page's starttime
/// and endtime come from its own first and last timestamp.
///
/// A `prev_count` that leaves no room yields only full-sized pages.
pub fn paginate(
    history: LocationHistory,
    max_count: usize,
    prev_count: usize,
) -> Vec<LocationHistory> {
    debug_assert!(max_count > 0, "segments must hold at least one sample");

    let first_capacity = max_count.saturating_sub(prev_count);
    if history.count <= first_capacity {
        return vec![history];
    }

    let LocationHistory { vid, timestamps, coordinates, .. } = history;
    let mut timestamps = timestamps.into_iter();
    let mut coordinates = coordinates.into_iter();

    let mut pages = Vec::new();
    let mut available = if first_capacity == 0 { max_count } else { first_capacity };
    loop {
        let page_timestamps: Vec<i64> = timestamps.by_ref().take(available).collect();
        if page_timestamps.is_empty() {
            break;
        }
        let page_coordinates = coordinates.by_ref().take(page_timestamps.len()).collect();
        if let Some(page) = LocationHistory::from_samples(&vid, page_timestamps, page_coordinates) {
            pages.push(page);
        }
        available = max_count;
    }
    pages
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Position;

    fn run_of(len: usize) -> LocationHistory {
        let timestamps: Vec<i64> = (0..len as i64).map(|i| i * 10).collect();
        let coordinates = (0..len).map(|i| Position::new(i as f64, 1.0)).collect();
        LocationHistory::from_samples("N-00-001", timestamps, coordinates).unwrap()
    }

    #[test]
    fn test_fits_without_split() {
        let history = run_of(3);
        let pages = paginate(history.clone(), 100, 97);
        assert_eq!(pages, vec![history]);
    }

    #[test]
    fn test_first_page_tops_up_previous_segment() {
        let pages = paginate(run_of(250), 100, 60);
        let sizes: Vec<usize> = pages.iter().map(|p| p.count).collect();
        assert_eq!(sizes, vec![40, 100, 100, 10]);

        assert_eq!(pages[0].starttime, 0);
        assert_eq!(pages[0].endtime, 390);
        assert_eq!(pages[1].starttime, 400);
        assert_eq!(pages[3].endtime, 2490);
        assert!(pages.iter().all(LocationHistory::is_well_formed));
    }

    #[test]
    fn test_exact_multiple_leaves_no_empty_page() {
        let pages = paginate(run_of(200), 100, 0);
        let sizes: Vec<usize> = pages.iter().map(|p| p.count).collect();
        assert_eq!(sizes, vec![100, 100]);
    }

    #[test]
    fn test_full_previous_segment_gives_full_pages() {
        let pages = paginate(run_of(150), 100, 100);
        let sizes: Vec<usize> = pages.iter().map(|p| p.count).collect();
        assert_eq!(sizes, vec![100, 50]);
    }
}

use proptest::prelude::*;
use waypoint::compaction::paginate;
use waypoint::core::{LocationHistory, Position};

fn run_of(len: usize) -> LocationHistory {
    let timestamps: Vec<i64> = (0..len as i64).map(|i| 1_000 + i * 7).collect();
    let coordinates = (0..len).map(|i| Position::new(i as f64 / 10.0, -(i as f64) / 10.0)).collect();
    LocationHistory::from_samples("N-00-042", timestamps, coordinates).unwrap()
}

#[test]
fn test_single_point_into_nearly_full_segment() {
    let pages = paginate(run_of(3), 100, 99);
    let sizes: Vec<usize> = pages.iter().map(|p| p.count).collect();
    assert_eq!(sizes, vec![1, 2]);
    assert_eq!(pages[1].starttime, pages[1].timestamps[0]);
}

proptest! {
    #[test]
    fn prop_pages_reassemble_the_input(len in 1usize..400, max in 1usize..120, prev_seed in 0usize..120) {
        let prev = prev_seed % (max + 1);
        let history = run_of(len);
        let pages = paginate(history.clone(), max, prev);

        let timestamps: Vec<i64> = pages.iter().flat_map(|p| p.timestamps.clone()).collect();
        let coordinates: Vec<Position> = pages.iter().flat_map(|p| p.coordinates.clone()).collect();
        prop_assert_eq!(&timestamps, &history.timestamps);
        prop_assert_eq!(&coordinates, &history.coordinates);
        prop_assert_eq!(pages.iter().map(|p| p.count).sum::<usize>(), history.count);

        let first_capacity = if prev >= max { max } else { max - prev };
        prop_assert!(pages[0].count <= first_capacity);
        for page in &pages[1..] {
            prop_assert!(page.count <= max);
        }
        for page in &pages {
            prop_assert!(page.is_well_formed());
            prop_assert_eq!(page.vid.as_str(), "N-00-042");
        }
    }
}

use crate::dataset::{EpisodeKey, EpisodeTable};
use crate::filters::{
    by_characters, by_rating, by_season, EpisodeFilter, FilterError, RatingRange,
};
use crate::tests::support::query_tables;

fn keys(table: &EpisodeTable) -> Vec<String> {
    table.iter().map(|ep| ep.key.to_string()).collect()
}

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

#[test]
fn test_no_filters_returns_input() {
    let (episodes, dialogue) = query_tables();
    let filtered = EpisodeFilter::default().apply(&episodes, &dialogue).unwrap();
    assert_eq!(filtered, episodes);
}

#[test]
fn test_season_filter() {
    let (episodes, _) = query_tables();
    let seasons = |list: &[u32]| keys(&by_season(&episodes, Some(list)).unwrap());

    assert_eq!(seasons(&[1]), vec!["S01E01", "S01E02"]);
    assert_eq!(seasons(&[2, 1]), vec!["S01E01", "S01E02", "S02E02"]);
    assert!(seasons(&[]).is_empty());
}

#[test]
fn test_unknown_season_is_rejected() {
    let (episodes, dialogue) = query_tables();
    assert_eq!(
        by_season(&episodes, Some([2, 7].as_slice())).unwrap_err(),
        FilterError::UnknownSeason(7)
    );

    let filter = EpisodeFilter {
        seasons: Some(vec![99]),
        ..Default::default()
    };
    let err = filter.apply(&episodes, &dialogue).unwrap_err();
    assert!(err.is_unknown_reference());
}

#[test]
fn test_rating_ranges() {
    let (episodes, _) = query_tables();
    let rated = |low, high| keys(&by_rating(&episodes, Some(RatingRange::new(low, high).unwrap())));

    assert_eq!(rated(5.0, 9.0), vec!["S01E01", "S01E02"]);
    assert_eq!(rated(7.0, 8.0), vec!["S01E01"]);
    assert!(rated(2.0, 3.0).is_empty());
    assert_eq!(rated(7.4, 7.4), vec!["S01E01"]);
}

#[test]
fn test_character_filter_requires_every_character() {
    let (episodes, dialogue) = query_tables();
    let with = |list: Vec<String>| {
        keys(&by_characters(&episodes, &dialogue, Some(list.as_slice())).unwrap())
    };

    assert_eq!(with(names(&["JERRY"])), vec!["S01E01", "S01E02"]);
    assert_eq!(with(names(&["JERRY", "GEORGE"])), vec!["S01E01", "S01E02"]);
    assert_eq!(with(names(&["GEORGE", "KRAMER"])), vec!["S02E02"]);
    assert!(with(names(&["JERRY", "KRAMER"])).is_empty());
}

#[test]
fn test_character_filter_splits_joint_credits() {
    let (episodes, dialogue) = query_tables();
    let elaine =
        by_characters(&episodes, &dialogue, Some(names(&["ELAINE"]).as_slice())).unwrap();
    assert_eq!(keys(&elaine), vec!["S01E02"]);

    let padded =
        by_characters(&episodes, &dialogue, Some(names(&[" ELAINE "]).as_slice())).unwrap();
    assert_eq!(padded, elaine);
}

#[test]
fn test_character_filter_edge_cases() {
    let (episodes, dialogue) = query_tables();
    assert_eq!(
        by_characters(&episodes, &dialogue, Some(&[][..])).unwrap(),
        episodes
    );
    assert_eq!(by_characters(&episodes, &dialogue, None).unwrap(), episodes);

    // known speakers who never share an episode
    let apart = names(&["ELAINE", "KRAMER"]);
    assert!(by_characters(&episodes, &dialogue, Some(apart.as_slice()))
        .unwrap()
        .is_empty());
}

#[test]
fn test_unknown_character_is_rejected() {
    let (episodes, dialogue) = query_tables();
    let err = by_characters(
        &episodes,
        &dialogue,
        Some(names(&["JERRY", " JABRONI "]).as_slice()),
    )
    .unwrap_err();
    assert_eq!(err, FilterError::UnknownCharacter("JABRONI".to_string()));
    assert!(err.is_unknown_reference());
}

#[test]
fn test_known_values_without_match_are_empty() {
    let (episodes, dialogue) = query_tables();

    // ELAINE speaks only in season 1
    let filter = EpisodeFilter {
        seasons: Some(vec![2]),
        characters: Some(names(&["ELAINE"])),
        ..Default::default()
    };
    assert!(filter.apply(&episodes, &dialogue).unwrap().is_empty());
}

#[test]
fn test_every_filter_combination() {
    let (episodes, dialogue) = query_tables();
    let seasons = vec![1];
    let rating = RatingRange::new(7.0, 10.0).unwrap();
    let characters = names(&["JERRY"]);

    for mask in 0..8u8 {
        let filter = EpisodeFilter {
            seasons: (mask & 1 != 0).then(|| seasons.clone()),
            rating: (mask & 2 != 0).then_some(rating),
            characters: (mask & 4 != 0).then(|| characters.clone()),
        };
        let result = filter.apply(&episodes, &dialogue).unwrap();

        // intersection of the single filters, in table order
        let expected: Vec<EpisodeKey> = episodes
            .iter()
            .filter(|ep| filter.seasons.is_none() || ep.season == 1)
            .filter(|ep| filter.rating.is_none() || rating.contains(ep.rating))
            .filter(|ep| filter.characters.is_none() || ep.key != EpisodeKey::new(2, 2))
            .map(|ep| ep.key.clone())
            .collect();
        let found: Vec<EpisodeKey> = result.iter().map(|ep| ep.key.clone()).collect();
        assert_eq!(found, expected, "mask {mask:03b}");

        for ep in result.iter() {
            if filter.seasons.is_some() {
                assert_eq!(ep.season, 1);
            }
            if filter.rating.is_some() {
                assert!(ep.rating >= 7.0 && ep.rating <= 10.0);
            }
        }
    }

    let all = EpisodeFilter {
        seasons: Some(seasons),
        rating: Some(rating),
        characters: Some(characters),
    };
    assert_eq!(
        keys(&all.apply(&episodes, &dialogue).unwrap()),
        vec!["S01E01", "S01E02"]
    );
}

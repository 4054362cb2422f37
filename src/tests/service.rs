use serde_json::json;
use std::sync::Arc;

use crate::config::Config;
use crate::dataset::EpisodeKey;
use crate::filters::{EpisodeFilter, RatingRange};
use crate::recommend::DEFAULT_WEIGHTS;
use crate::service::{EpisodeService, ServiceError};
use crate::tests::support::{duplicate_tables, query_tables, HashingEmbedder, PURPLE_LINE};

fn service(dir: &tempfile::TempDir) -> EpisodeService {
    let config = Config::load_with(dir.path()).unwrap();
    let (episodes, dialogue) = query_tables();
    EpisodeService::new(config, episodes, dialogue).with_embedder(Arc::new(HashingEmbedder))
}

#[test]
fn test_open_reads_configured_tables() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("episode_info.csv"),
        "Season,EpisodeNo,SEID,Title,averageRating,numVotes,Description,Summaries,keyWords\n\
         1,1,S01E01,\"Good News, Bad News\",7.4,6031,Pilot,\"['Jerry waits']\",\"['cafe']\"\n",
    )
    .unwrap();
    std::fs::write(
        dir.path().join("dialogue.csv"),
        "Character,Dialogue,SEID,Season,EpisodeNo,Happy,Angry,Surprise,Sad,Fear\n\
         JERRY,Are you through?,S01E01,1,1,0,0,0,0,0\n",
    )
    .unwrap();

    let config = Config::load_with(dir.path()).unwrap();
    let service = EpisodeService::open(config).unwrap();
    assert_eq!(service.episodes().len(), 1);
    assert_eq!(service.dialogue().len(), 1);
}

#[test]
fn test_open_missing_tables() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config::load_with(dir.path()).unwrap();
    let err = EpisodeService::open(config).err().unwrap();
    assert!(matches!(err, ServiceError::Dataset(_)));
}

#[test]
fn test_weights_before_and_after_build() {
    let dir = tempfile::tempdir().unwrap();
    let service = service(&dir);
    assert_eq!(service.weights().unwrap().as_slice(), &DEFAULT_WEIGHTS);

    service.set_weights(vec![1.0; 7]).unwrap();
    assert_eq!(service.weights().unwrap().as_slice(), &[1.0; 7]);

    service.reset_weights().unwrap();
    assert_eq!(service.weights().unwrap().as_slice(), &DEFAULT_WEIGHTS);

    let err = service.set_weights(vec![1.0]).unwrap_err();
    assert!(err.is_input_shape());
}

#[test]
fn test_configured_default_weights_are_reset_target() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("config.yaml"),
        "recommender:\n  weights:\n    dialogue: 0.0\n",
    )
    .unwrap();
    let service = service(&dir);

    service.set_weights(vec![1.0; 7]).unwrap();
    service.reset_weights().unwrap();
    assert_eq!(service.weights().unwrap().as_slice()[0], 0.0);
}

#[test]
fn test_recommend_through_service() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config::load_with(dir.path()).unwrap();
    let (episodes, dialogue) = duplicate_tables();
    let service = EpisodeService::new(config, episodes, dialogue)
        .with_embedder(Arc::new(HashingEmbedder));

    let result = service.recommend(&["The Stakeout"], 2).unwrap();
    let mut titles: Vec<&str> = result.iter().map(|ep| ep.title.as_str()).collect();
    titles.sort();
    assert_eq!(titles, vec!["The Stakeout2", "The Stakeout3"]);

    let err = service
        .recommend_json(&json!({"seeds": ["The Jabroni"], "count": 1}))
        .unwrap_err();
    assert!(err.is_unknown_reference());
    assert!(!err.is_input_shape());

    let err = service
        .recommend_json(&json!({"seeds": [true], "count": 1}))
        .unwrap_err();
    assert!(err.is_input_shape());
    assert!(!err.is_unknown_reference());
}

#[test]
fn test_query_without_shards_fails_until_precompute() {
    let dir = tempfile::tempdir().unwrap();
    let service = service(&dir);

    let err = service
        .query("stake out the lobby", &EpisodeFilter::default())
        .unwrap_err();
    assert!(matches!(err, ServiceError::Corpus(_)));

    let summary = service.precompute(false).unwrap();
    assert_eq!(summary.lines, 8);
    assert_eq!(summary.shards, 1);
    assert!(dir.path().join("embeddings").join("tensor_0.bin").exists());

    let response = service
        .query("stake out the lobby at lunchtime", &EpisodeFilter::default())
        .unwrap();
    assert_eq!(response.filtered.len(), 3);
    assert_eq!(response.results[0].key, EpisodeKey::new(1, 2));
    assert!(response.results.len() <= 5);
}

#[test]
fn test_query_with_no_matching_episode_skips_search() {
    let dir = tempfile::tempdir().unwrap();
    let service = service(&dir);

    // no shards exist, so reaching the corpus would fail
    let filter = EpisodeFilter {
        rating: Some(RatingRange::new(2.0, 3.0).unwrap()),
        ..Default::default()
    };
    let response = service.query("anything", &filter).unwrap();
    assert!(response.filtered.is_empty());
    assert!(response.results.is_empty());
}

#[test]
fn test_query_with_unknown_filter_value() {
    let dir = tempfile::tempdir().unwrap();
    let service = service(&dir);

    let filter = EpisodeFilter {
        characters: Some(vec!["JABRONI".to_string()]),
        ..Default::default()
    };
    let err = service.query("anything", &filter).unwrap_err();
    assert!(err.is_unknown_reference());
    assert!(!err.is_input_shape());

    let filter = EpisodeFilter {
        seasons: Some(vec![9]),
        ..Default::default()
    };
    let err = service.query("anything", &filter).unwrap_err();
    assert!(err.is_unknown_reference());

    let err = RatingRange::new(9.0, 7.0).map_err(ServiceError::from).unwrap_err();
    assert!(err.is_input_shape());
    assert!(!err.is_unknown_reference());
}

#[test]
fn test_query_reports_filtered_universe() {
    let dir = tempfile::tempdir().unwrap();
    let service = service(&dir);
    service.precompute(false).unwrap();

    let filter = EpisodeFilter {
        characters: Some(vec!["JERRY".to_string()]),
        ..Default::default()
    };
    let response = service.query("purple buttons", &filter).unwrap();
    let universe: Vec<String> = response.filtered.iter().map(|ep| ep.key.to_string()).collect();
    assert_eq!(universe, vec!["S01E01", "S01E02"]);
    assert!(response
        .results
        .iter()
        .all(|ep| ep.key != EpisodeKey::new(2, 2)));
}

#[test]
fn test_script_lookup() {
    let dir = tempfile::tempdir().unwrap();
    let service = service(&dir);

    let lines = service.script_for_title("Good News, Bad News");
    assert_eq!(lines.len(), 4);
    assert!(lines.iter().all(|line| line.key == EpisodeKey::new(1, 1)));

    assert!(service.script_for_title("Good Bad News").is_empty());

    // both episodes titled "The Stakeout"
    let lines = service.script_for_title("The Stakeout");
    assert_eq!(lines.len(), 4);
    assert_eq!(lines[0].text, PURPLE_LINE);
}

#[test]
fn test_line_counts() {
    let dir = tempfile::tempdir().unwrap();
    let service = service(&dir);

    let counts = service.line_counts(None);
    assert_eq!(counts[0], ("JERRY".to_string(), 4));
    assert_eq!(counts[1], ("GEORGE".to_string(), 3));
    assert_eq!(service.line_counts(Some(2)).len(), 2);

    let per_episode = service.character_line_counts(&["JERRY".to_string(), "JABRONI".to_string()]);
    assert_eq!(per_episode[0], ("JERRY".to_string(), vec![3, 1, 0]));
    assert_eq!(per_episode[1], ("JABRONI".to_string(), vec![0, 0, 0]));
    assert!(service.character_line_counts(&[]).is_empty());
}

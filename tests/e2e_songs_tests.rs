//! End-to-end tests for the song catalog and query-by-humming flow.
//!
//! A mock transcription service is spawned on a random local port; it
//! answers every request with the path of a prepared pitch artifact.

mod common;

use std::path::Path;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::{routing::post, Json, Router};
use common::{body_json, multipart_request, spawn_app, TestApp};
use melisma_retrieval_server::features::pitch::save_pitch_sequence;
use melisma_retrieval_server::features::transcription::TranscriptionClient;
use melisma_retrieval_server::qbi::{ComponentInit, QbiEngine, QbiScoringMode};
use melisma_retrieval_server::retrieval::RetrievalOrchestrator;
use serde_json::json;
use tower::ServiceExt;

/// Serve `{"full_path": <artifact>}` for every transcription request.
async fn spawn_mock_transcriber(artifact_path: String) -> String {
    let app = Router::new().route(
        "/convert-to-midi/",
        post(move || {
            let artifact_path = artifact_path.clone();
            async move { Json(json!({ "full_path": artifact_path })) }
        }),
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind mock transcriber");
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{}", addr)
}

/// Seed a catalog song whose pitch artifact holds `pitches`.
fn seed_song(test_app: &TestApp, name: &str, pitches: &[u8]) -> i64 {
    let artifact = test_app
        .uploads
        .root()
        .join("songs")
        .join(format!("{}_data.json", name));
    save_pitch_sequence(&artifact, pitches).unwrap();
    test_app
        .store
        .insert_song(
            name,
            &format!("audio/{}.wav", name),
            &format!("audio/{}.mid", name),
            &artifact.to_string_lossy(),
        )
        .unwrap()
        .id
}

#[tokio::test]
async fn empty_catalog_lists_no_songs() {
    let test_app = spawn_app("http://127.0.0.1:1");

    let response = test_app
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/songs")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["totalItems"], 0);
    assert!(json["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn midi_upload_passes_through_without_transcription() {
    // Unreachable transcriber: the .mid shortcut must not call it
    let test_app = spawn_app("http://127.0.0.1:1");

    let response = test_app
        .app
        .clone()
        .oneshot(multipart_request(
            "/api/songs/upload",
            "melody.mid",
            b"MThd fake midi bytes",
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["message"], "File uploaded and song created successfully");

    let songs = test_app.store.all_songs().unwrap();
    assert_eq!(songs.len(), 1);
    // Passthrough: the upload is its own MIDI form, no pitch artifact
    assert_eq!(songs[0].audio_file_path, songs[0].audio_file_path_midi);
    assert!(songs[0].midi_json.is_empty());
}

#[tokio::test]
async fn song_upload_records_transcription_artifacts() {
    // The artifact lives outside the app's uploads root; only its path
    // travels through the transcription response
    let artifact_dir = tempfile::tempdir().unwrap();
    let artifact = artifact_dir.path().join("recording_data.json");
    save_pitch_sequence(&artifact, &[60, 62, 64]).unwrap();

    let transcriber_url = spawn_mock_transcriber(artifact.to_string_lossy().to_string()).await;
    let test_app = spawn_app(&transcriber_url);

    let response = test_app
        .app
        .clone()
        .oneshot(multipart_request(
            "/api/songs/upload",
            "recording.wav",
            b"riff raff audio bytes",
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let songs = test_app.store.all_songs().unwrap();
    assert_eq!(songs.len(), 1);
    assert_eq!(songs[0].midi_json, artifact.to_string_lossy());
    assert_eq!(songs[0].audio_file_path_midi, artifact.to_string_lossy());
}

#[tokio::test]
async fn humming_search_ranks_matching_song_first() {
    let test_app = spawn_app("http://127.0.0.1:1");

    // Catalog: one song embedding the hummed phrase, one distant song,
    // and one unscoreable passthrough song
    let matching_id = seed_song(&test_app, "matching", &[72, 60, 62, 64, 76]);
    seed_song(&test_app, "different", &[30, 95, 31, 96, 32, 97]);
    test_app
        .store
        .insert_song("passthrough.mid", "a.mid", "a.mid", "")
        .unwrap();

    // The query transcribes to the embedded phrase
    let query_artifact = test_app.uploads.root().join("query_data.json");
    save_pitch_sequence(&query_artifact, &[60, 62, 64]).unwrap();
    let transcriber_url =
        spawn_mock_transcriber(query_artifact.to_string_lossy().to_string()).await;

    // Point a fresh orchestrator at the live mock, reusing the catalog
    let orchestrator = Arc::new(RetrievalOrchestrator::new(
        test_app.store.clone(),
        test_app.uploads.clone(),
        Arc::new(TranscriptionClient::new(transcriber_url, 5)),
        Arc::new(QbiEngine::new(100, ComponentInit::Deterministic)),
        QbiScoringMode::Model,
        ComponentInit::Deterministic,
    ));

    let outcome = orchestrator
        .search_by_humming("hum.wav", b"hummed audio bytes")
        .await
        .unwrap();

    assert!(!outcome.matches.is_empty());
    assert_eq!(outcome.matches[0].song.id, matching_id);
    assert!(outcome.matches[0].similarity >= 0.99);
    assert!(outcome.elapsed_seconds >= 0.0);

    // The unscoreable passthrough song never appears
    assert!(outcome
        .matches
        .iter()
        .all(|m| m.song.name != "passthrough.mid"));

    // The hummed upload is deleted afterwards
    let hummings_dir = test_app.uploads.root().join("hummings");
    let leftovers: Vec<_> = std::fs::read_dir(&hummings_dir)
        .map(|entries| entries.collect())
        .unwrap_or_default();
    assert!(leftovers.is_empty());
}

#[tokio::test]
async fn humming_search_with_failing_transcriber_is_client_error() {
    let test_app = spawn_app("http://127.0.0.1:1");
    seed_song(&test_app, "anything", &[60, 62]);

    let response = test_app
        .app
        .clone()
        .oneshot(multipart_request(
            "/api/songs/search-by-audio",
            "hum.wav",
            b"audio",
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unassociated_songs_listing() {
    let test_app = spawn_app("http://127.0.0.1:1");
    let loose_id = seed_song(&test_app, "loose", &[60]);

    let response = test_app
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/songs/unassociated")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    let songs = json.as_array().unwrap();
    assert_eq!(songs.len(), 1);
    assert_eq!(songs[0]["ID"], loose_id);
}

#[tokio::test]
async fn delete_song_removes_row_and_artifacts() {
    let test_app = spawn_app("http://127.0.0.1:1");

    // Materialize the audio files the row points at
    let songs_dir = test_app.uploads.root().join("songs");
    std::fs::create_dir_all(&songs_dir).unwrap();
    let audio_path = songs_dir.join("gone.wav");
    let midi_path = songs_dir.join("gone.mid");
    std::fs::write(&audio_path, b"wav").unwrap();
    std::fs::write(&midi_path, b"mid").unwrap();
    let artifact_path = songs_dir.join("gone_data.json");
    save_pitch_sequence(&artifact_path, &[60]).unwrap();

    let song = test_app
        .store
        .insert_song(
            "gone",
            &audio_path.to_string_lossy(),
            &midi_path.to_string_lossy(),
            &artifact_path.to_string_lossy(),
        )
        .unwrap();

    let uri = format!("/api/songs/{}", song.id);
    let response = test_app
        .app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(&uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    assert!(!audio_path.exists());
    assert!(!midi_path.exists());
    assert!(!artifact_path.exists());
    assert!(test_app.store.get_song(song.id).unwrap().is_none());

    let response = test_app
        .app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(&uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

/// Deleting a song whose files never existed still removes the row.
#[tokio::test]
async fn delete_song_tolerates_missing_files() {
    let test_app = spawn_app("http://127.0.0.1:1");
    let song = test_app
        .store
        .insert_song("ghost", "nowhere/a.wav", "nowhere/a.mid", "nowhere/a.json")
        .unwrap();

    assert!(!Path::new("nowhere/a.wav").exists());
    let deleted = test_app.orchestrator.delete_song(song.id).await.unwrap();
    assert!(deleted);
    assert!(test_app.store.get_song(song.id).unwrap().is_none());
}

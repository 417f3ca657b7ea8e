mod orchestrator;

pub use orchestrator::{
    AlbumIngest, AlbumMatch, RetrievalError, RetrievalOrchestrator, SearchOutcome, SongIngest,
    SongMatch, FEATURE_HEIGHT, FEATURE_WIDTH,
};

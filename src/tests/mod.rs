// Marlin's Test Infrastructure
//
// Leaf modules keep small unit tests next to the code. Everything that needs real parsing, a
// store on disk or a running engine lives here.


// ============================================================================
// CORE - store and language plumbing
// ============================================================================
pub mod core {
    pub mod database;
    pub mod registry;
}

// ============================================================================
// EXTRACTORS - one file per language family
// ============================================================================
pub mod extractors {
    pub mod python;
    pub mod rust;
    pub mod typescript;
}


// ============================================================================
// ENGINE - end-to-end scenarios through CodeIntelligenceEngine
// ============================================================================
pub mod engine {
    pub mod indexing;
    pub mod navigation;
    pub mod semantic;
    pub mod watch;
}

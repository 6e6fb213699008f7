//! zotu - Amplicon Denoising and Taxonomy Toolkit
//!
//! The algorithmic core of a 16S/ITS amplicon pipeline: PhiX decontamination,
//! dereplication, UNOISE3 denoising into zero-radius OTUs, UCHIME2-style
//! chimera removal, and two k-mer taxonomy classifiers.
//!
//! # Modules
//! - `seqio`: FASTA/FASTQ file I/O with gzip support
//! - `labels`: `;size=N;` / `;tax=...;` header annotation parsing
//! - `kmer`: 2-bit encoding and unique 8-mer extraction
//! - `edit`: banded edit distance with early exit
//! - `align`: banded global alignment with path recovery
//! - `derep`: exact dereplication with abundance annotation
//! - `unoise`: UNOISE3 denoiser
//! - `uchime`: UCHIME2 crossover chimera detector
//! - `sintax`: SINTAX posting-list classifier
//! - `nbc`: Naive Bayesian taxonomy classifier
//! - `phix`: PhiX174 8-mer contamination filter
//! - `rng`: deterministic generators for bootstrap resampling
//! - `cli`: shared driver plumbing

pub mod align;
pub mod cli;
pub mod derep;
pub mod edit;
pub mod kmer;
pub mod labels;
pub mod nbc;
pub mod phix;
pub mod rng;
pub mod seqio;
pub mod sintax;
pub mod uchime;
pub mod unoise;

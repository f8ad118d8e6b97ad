use thiserror::Error;

use crate::{
    diagnostics::IssueSet,
    model::{Layer, Representation},
    sexpr::Span,
    synth::Shape,
    validate::Issue,
};

/// S-expression parse errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("SExpr {0} not found")]
    MissingChild(String),
    #[error("Value for {0} not found")]
    MissingValue(String),
    #[error("Invalid number {0:?}")]
    InvalidNumber(String),
    #[error("Unexpected end of input at {at:?}")]
    UnexpectedEof { at: Span },
    #[error("Expected {expected}, found {found} at {at:?}")]
    UnexpectedToken {
        expected: String,
        found: String,
        at: Span,
    },
    #[error("Unknown token {found:?} at {at:?}")]
    UnknownToken { found: String, at: Span },
    #[error("Trailing input after the root expression at {at:?}")]
    TrailingInput { at: Span },
}

/// The inputs describe connectivity that cannot exist. Always fatal.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigurationError {
    #[error("net {net}: component {ref_des} does not exist")]
    UnknownComponent { net: String, ref_des: String },
    #[error("component {ref_des}: connection point {pin} not found")]
    PinNotFound { ref_des: String, pin: String },
    #[error("component {ref_des}: type {type_id} is not defined")]
    UnknownType { ref_des: String, type_id: String },
    #[error("component {0} is placed more than once")]
    DuplicateComponent(String),
    #[error("{ref_des}:{pin} is a member of both {first} and {second}")]
    PinInMultipleNets {
        ref_des: String,
        pin: String,
        first: String,
        second: String,
    },
    #[error("net {0} has no members")]
    EmptyNet(String),
    #[error("net {0} is declared more than once")]
    DuplicateNet(String),
    #[error("net {0}: label connections exist only on schematics")]
    LabelsOnBoard(String),
    #[error("net {net}: visiting order is not a permutation of its {members} members")]
    InvalidVisitOrder { net: String, members: usize },
    #[error("component {ref_des}: board rotation {degrees} is not a multiple of 90 degrees")]
    NonManhattanRotation { ref_des: String, degrees: f64 },
    #[error("{context} refers to unknown net {net}")]
    UnknownNet { context: &'static str, net: String },
    #[error("corridor for net {net} targets hop {hop}, but the net has {hops} hops")]
    InvalidHop { net: String, hop: usize, hops: usize },
    #[error("{0} must be loaded from a document, but none was given")]
    MissingSource(&'static str),
    #[error("net member {0:?} is not of the form REF:PIN")]
    InvalidMember(String),
    #[error("corridor for net {net}: {reason}")]
    InvalidCorridor { net: String, reason: &'static str },
    #[error("{context}: layer {layer} does not exist in a {representation:?}")]
    InvalidLayer {
        context: String,
        layer: Layer,
        representation: Representation,
    },
}

/// A route for `net` would touch geometry already committed by `other_net`.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("net {net} conflicts with {other_net} on {layer}: {ours} vs {theirs}")]
pub struct GeometryConflict {
    pub net: String,
    pub other_net: String,
    pub layer: Layer,
    pub ours: Shape,
    pub theirs: Shape,
}

/// The persisted document cannot be split into top-level elements.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DocumentStructureError {
    #[error("document is not a balanced s-expression: {0}")]
    Parse(#[from] ParseError),
    #[error("expected a ({expected} ...) document, found ({found} ...)")]
    UnexpectedRoot { expected: String, found: String },
    #[error("malformed {element} element: {source}")]
    Malformed {
        element: String,
        #[source]
        source: ParseError,
    },
}

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error("{} geometry conflict(s), first: {}", .0.len(), .0.first().map(ToString::to_string).unwrap_or_default())]
    Conflicts(Vec<GeometryConflict>),
    #[error(transparent)]
    Document(#[from] DocumentStructureError),
    #[error("validation failed with {} error(s) and {} warning(s)", .0.num_errors(), .0.num_warnings())]
    Validation(IssueSet<Issue>),
    #[error("invalid job description: {0}")]
    Job(#[from] serde_json::Error),
}

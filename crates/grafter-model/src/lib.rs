//! Grafter property-graph model
//!
//! Shared vocabulary for every pipeline stage:
//! - **Ids**: [`VertexId`] (`name` + optional `label`) and [`EdgeId`]
//!   (`src`, `dst`, `label`), with a canonical raw-id text used for hashing
//! - **Properties**: [`PropValue`] scalars in an ordered [`PropertyMap`]
//! - **Elements**: [`Vertex`], [`Edge`] and the [`GraphElement`] sum type
//! - **Codecs**: tab-separated vertex, edge and dictionary lines
//! - **Seams**: [`Tokenizer`], [`RecordClassifier`], [`GraphStore`],
//!   [`StoreConnector`]

pub mod codec;
mod element;
mod error;
mod id;
mod store;
mod tokenize;
mod value;

pub use codec::{DictionaryEntry, EdgeLine, ListRecordClassifier, ResolvedEdge, VertexLine};
pub use element::{Edge, EdgeData, GraphElement, Vertex, VertexData};
pub use error::ParseError;
pub use id::{EdgeId, VertexId, VertexName, LABEL_SEPARATOR};
pub use store::{
    is_reserved_key, EdgeHandle, ElementHandle, GraphStore, StoreConnector, StoreError, StoreId,
    LABEL_KEY, RAW_ID_KEY, RESERVED_KEYS,
};
pub use tokenize::{RecordClassifier, Tokenizer, Tokens};
pub use value::{props, PropValue, PropertyMap};

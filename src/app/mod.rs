pub mod collection;
pub mod methods;
pub mod publication;

pub use collection::{GuardedCollection, GuardedCollectionBuilder, Role};
pub use methods::{Methods, ProcedureNames, UpdateInput};
pub use publication::{
    ChannelState, ChannelUpdate, ChildDescriptor, CountRegistry, LiveCount, Publication,
    PublishedSet, ReadChannels,
};

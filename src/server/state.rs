use crate::pipeline::PagePipeline;

pub(crate) struct ServerState {
    pub(crate) pipeline: PagePipeline,
}

pub mod codec;
pub mod dispatcher;
pub mod events;
pub mod hook;
pub mod interpreter;
pub mod invoker;
pub mod registry;

pub use codec::{decode_response, encode_request, HookResponse, ProtocolError, RequestMeta, PROTOCOL_VERSION};
pub use dispatcher::{DispatchContext, Dispatcher, EventOutcome, Rejection};
pub use events::{
    Gate, HookEvent, HookEventKind, PostToolUse, PreToolUse, PreviousState, TaskCancel,
    TaskComplete, TaskMetadata, TaskResume, TaskStart, UnknownEvent, UserPromptSubmit,
};
pub use hook::{Hook, HookDescriptor, HookScope, InvocationRequest, ProcessOutput, Termination};
pub use interpreter::{interpret, Fault, HookDecision, HookInvocation, InvocationOutcome, Verdict};
pub use invoker::ProcessHook;
pub use registry::{HookRegistry, RegistrySettings, ResolvedHooks};

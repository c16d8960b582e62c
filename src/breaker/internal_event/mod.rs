//! Metrics emitted by breakers.
//!
//! Events are registered once per breaker so the metric handles, and their
//! label sets, are resolved up front instead of on every call.

mod breaker;

pub(crate) use breaker::{
    BreakerAdmission, BreakerAdmissionHandle, BreakerOutcome, BreakerOutcomeHandle, Outcome,
};

pub trait InternalEventHandle: Sized {
    type Data: Sized;
    fn emit(&self, data: Self::Data);
}

pub trait RegisterInternalEvent: Sized {
    type Handle: InternalEventHandle;

    fn name(&self) -> Option<&'static str> {
        None
    }

    fn register(self) -> Self::Handle;
}

/// Declares an event struct together with its registered handle.
///
/// The handle fields are built from the event's own fields, which are in scope
/// by name inside the initializer expressions.
#[macro_export]
macro_rules! registered_event {
    ($event:ident => $($tail:tt)*) => {
        $crate::registered_event!($event {} => $($tail)*);
    };

    (
        $event:ident { $( $field:ident : $type:ty ),* $(,)? } => {
            $( $reg_name:ident : $reg_type:ty = $reg_expr:expr ),* $(,)?
        }

        fn emit(&$slf:ident, $data_name:ident : $data_type:ty) $emit_body:block
    ) => {
        #[derive(Debug)]
        pub struct $event {
            $( pub $field: $type, )*
        }

        paste::paste! {
            #[derive(Clone)]
            pub struct [<$event Handle>] {
                $( $reg_name: $reg_type, )*
            }

            impl $crate::breaker::internal_event::RegisterInternalEvent for $event {
                type Handle = [<$event Handle>];

                fn name(&self) -> Option<&'static str> {
                    Some(stringify!($event))
                }

                #[allow(unused_variables)]
                fn register(self) -> Self::Handle {
                    let $event { $( $field, )* } = self;
                    [<$event Handle>] {
                        $( $reg_name: $reg_expr, )*
                    }
                }
            }

            impl $crate::breaker::internal_event::InternalEventHandle for [<$event Handle>] {
                type Data = $data_type;

                fn emit(&$slf, $data_name: $data_type) $emit_body
            }
        }
    };
}

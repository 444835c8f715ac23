use crate::common::frame::Frame;
use crate::common::function::FunctionCode;
use crate::decode::AppDecodeLevel;
use crate::exception::ExceptionCode;
use crate::server::operation::{Operation, OperationDisplay};
use crate::server::request::Request;
use crate::server::store::RegisterStore;
use crate::types::AddressMode;

/// Routes decoded request frames to the register store and builds their responses
///
/// Every call to [`Dispatcher::handle`] yields exactly one response frame, either
/// a normal response or an exception response. It never fails.
#[derive(Clone, Debug)]
pub struct Dispatcher {
    store: RegisterStore,
    mode: AddressMode,
    level: AppDecodeLevel,
}

impl Dispatcher {
    /// Create a dispatcher operating on `store`
    pub fn new(store: RegisterStore, mode: AddressMode, level: AppDecodeLevel) -> Self {
        Self { store, mode, level }
    }

    /// Process one request frame, returning the response to send back to its origin
    pub fn handle(&self, request: &Frame) -> Frame {
        let response = match self.run(request) {
            Ok(payload) => request.build_response(payload),
            Err(ex) => request.build_exception(ex),
        };

        if self.level.enabled() {
            match response.exception() {
                Some(ex) => tracing::info!(
                    "PDU TX - Exception {:#04X} ({})",
                    response.function_code(),
                    ex
                ),
                None if self.level.data_headers() => tracing::info!(
                    "PDU TX - {:#04X} (data len = {})",
                    response.function_code(),
                    response.data().len()
                ),
                None => tracing::info!("PDU TX - {:#04X}", response.function_code()),
            }
        }

        response
    }

    pub(crate) fn process(&self, request: Request) {
        let response = self.handle(&request.frame);
        if request.reply.send(response).is_err() {
            tracing::debug!("requester from {} went away before the response", request.source);
        }
    }

    fn run(&self, request: &Frame) -> Result<Vec<u8>, ExceptionCode> {
        let function = match FunctionCode::get(request.function_code()) {
            Some(x) => x,
            None => {
                tracing::warn!(
                    "received unsupported function code: {:#04X}",
                    request.function_code()
                );
                return Err(ExceptionCode::IllegalFunction);
            }
        };

        let operation = match Operation::parse(function, request.data(), self.mode) {
            Ok(x) => x,
            Err(ex) => {
                tracing::warn!("rejecting {} request: {}", function, ex);
                return Err(ex);
            }
        };

        if self.level.enabled() {
            tracing::info!("PDU RX - {}", OperationDisplay::new(self.level, &operation));
        }

        operation.execute(&self.store).map_err(|err| {
            tracing::error!("unable to build {} response: {}", function, err);
            ExceptionCode::ServerDeviceFailure
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::frame::{register_count_payload, register_values_payload};
    use crate::serial::frame::RtuFrame;
    use crate::tcp::frame::TcpFrame;
    use crate::types::UnitId;

    fn dispatcher(mode: AddressMode) -> (RegisterStore, Dispatcher) {
        let store = RegisterStore::new();
        let dispatcher = Dispatcher::new(store.clone(), mode, AppDecodeLevel::DataValues);
        (store, dispatcher)
    }

    fn tcp(function: u8, data: Vec<u8>) -> Frame {
        TcpFrame::new(0x0102, UnitId::new(0x01), function, data).into()
    }

    #[test]
    fn unknown_function_code_is_illegal_function() {
        let (_, dispatcher) = dispatcher(AddressMode::Wrap);
        let response = dispatcher.handle(&tcp(255, vec![1, 2, 3]));
        assert_eq!(response.function_code(), 255);
        assert_eq!(response.exception(), Some(ExceptionCode::IllegalFunction));

        let response = dispatcher.handle(&tcp(0x2B, vec![]));
        assert_eq!(response.function_code(), 0xAB);
        assert_eq!(response.data(), &[0x01]);
    }

    #[test]
    fn reads_input_registers_across_the_top_of_the_address_space() {
        let (store, dispatcher) = dispatcher(AddressMode::Wrap);
        store.input_registers.set(65530, 1);
        store.input_registers.set(65535, 65535);

        let response = dispatcher.handle(&tcp(0x04, register_count_payload(65530, 6)));
        assert_eq!(response.exception(), None);
        assert_eq!(
            response.data(),
            &[12, 0, 1, 0, 0, 0, 0, 0, 0, 0, 0, 255, 255]
        );
    }

    #[test]
    fn writes_then_reads_coils() {
        let (store, dispatcher) = dispatcher(AddressMode::Wrap);

        let mut write = register_count_payload(100, 9);
        write.extend_from_slice(&[2, 255, 1]);
        let response = dispatcher.handle(&tcp(0x0F, write));
        assert_eq!(response.function_code(), 0x0F);
        assert_eq!(response.data(), &[0, 100, 0, 9]);
        assert!(store.coils.get(108));
        assert!(!store.coils.get(109));

        let response = dispatcher.handle(&tcp(0x01, register_count_payload(100, 16)));
        assert_eq!(response.data(), &[2, 255, 1]);
    }

    #[test]
    fn writes_then_reads_holding_registers() {
        let (store, dispatcher) = dispatcher(AddressMode::Wrap);

        let write = register_values_payload(7, 2, &[3, 4]).unwrap();
        let response = dispatcher.handle(&tcp(0x10, write));
        assert_eq!(response.data(), &[0, 7, 0, 2]);
        assert_eq!(store.holding_registers.read(7, 2), vec![3, 4]);

        let response = dispatcher.handle(&tcp(0x03, register_count_payload(6, 3)));
        assert_eq!(response.data(), &[6, 0, 0, 0, 3, 0, 4]);
    }

    #[test]
    fn write_multiple_registers_wraps() {
        let (store, dispatcher) = dispatcher(AddressMode::Wrap);
        let write = register_values_payload(65535, 2, &[0xAAAA, 0xBBBB]).unwrap();
        let response = dispatcher.handle(&tcp(0x10, write));
        assert_eq!(response.exception(), None);
        assert_eq!(store.holding_registers.get(65535), 0xAAAA);
        assert_eq!(store.holding_registers.get(0), 0xBBBB);
    }

    #[test]
    fn write_single_requests_echo_the_request() {
        let (store, dispatcher) = dispatcher(AddressMode::Wrap);

        let request = tcp(0x05, vec![0x00, 0x10, 0xFF, 0x00]);
        let response = dispatcher.handle(&request);
        assert_eq!(response, request);
        assert!(store.coils.get(0x10));

        let request = tcp(0x06, vec![0x00, 0x10, 0x12, 0x34]);
        let response = dispatcher.handle(&request);
        assert_eq!(response, request);
        assert_eq!(store.holding_registers.get(0x10), 0x1234);
    }

    #[test]
    fn bad_coil_value_is_illegal_data_value() {
        let (store, dispatcher) = dispatcher(AddressMode::Wrap);
        let response = dispatcher.handle(&tcp(0x05, vec![0x00, 0x10, 0x00, 0x01]));
        assert_eq!(response.function_code(), 0x85);
        assert_eq!(response.exception(), Some(ExceptionCode::IllegalDataValue));
        assert!(!store.coils.get(0x10));
    }

    #[test]
    fn malformed_payloads_are_illegal_data_value() {
        let (_, dispatcher) = dispatcher(AddressMode::Wrap);
        for request in [
            tcp(0x03, vec![0x00]),
            tcp(0x03, register_count_payload(0, 0)),
            tcp(0x03, register_count_payload(0, 126)),
            tcp(0x01, register_count_payload(0, 2001)),
            tcp(0x10, vec![0x00, 0x00, 0x00, 0x02, 0x03, 0x00, 0x01, 0x00]),
        ] {
            let response = dispatcher.handle(&request);
            assert_eq!(response.function_code(), request.function_code() | 0x80);
            assert_eq!(response.exception(), Some(ExceptionCode::IllegalDataValue));
        }
    }

    #[test]
    fn strict_mode_rejects_ranges_past_the_top() {
        let (store, dispatcher) = dispatcher(AddressMode::Strict);
        let response = dispatcher.handle(&tcp(0x04, register_count_payload(65530, 7)));
        assert_eq!(response.exception(), Some(ExceptionCode::IllegalDataAddress));

        let write = register_values_payload(65535, 2, &[1, 2]).unwrap();
        let response = dispatcher.handle(&tcp(0x10, write));
        assert_eq!(response.exception(), Some(ExceptionCode::IllegalDataAddress));
        assert_eq!(store.holding_registers.get(0), 0);

        let response = dispatcher.handle(&tcp(0x04, register_count_payload(65530, 6)));
        assert_eq!(response.exception(), None);
    }

    #[test]
    fn rtu_responses_keep_the_unit_id() {
        let (store, dispatcher) = dispatcher(AddressMode::Wrap);
        store.discrete_inputs.write(0, &[true, false, true]);
        let request: Frame =
            RtuFrame::new(UnitId::new(0x2A), 0x02, register_count_payload(0, 3)).into();
        let response = dispatcher.handle(&request);
        assert_eq!(response.unit_id(), UnitId::new(0x2A));
        assert_eq!(response.data(), &[1, 0b101]);
        let bytes = response.encode().unwrap();
        assert_eq!(RtuFrame::decode(&bytes).map(Frame::from), Ok(response));
    }

    #[test]
    fn tcp_responses_keep_the_transaction_id() {
        let (_, dispatcher) = dispatcher(AddressMode::Wrap);
        let response = dispatcher.handle(&tcp(0x03, register_count_payload(0, 1)));
        match response {
            Frame::Tcp(x) => {
                assert_eq!(x.tx_id(), 0x0102);
                assert_eq!(x.unit_id(), UnitId::new(0x01));
            }
            Frame::Rtu(_) => panic!("transport changed"),
        }
    }
}

pub mod analysis;
pub mod types;

use crate::analysis::{enforce_inner, forecast_inner, generate_inner};
use crate::types::*;
#[cfg(feature = "wasm")]
use wasm_bindgen::prelude::*;

// --- Wasm Wrappers ---

#[cfg(feature = "wasm")]
#[wasm_bindgen]
pub fn init_panic_hook() {
    console_error_panic_hook::set_once();
}

#[cfg(feature = "wasm")]
#[wasm_bindgen]
pub fn generate_scenario(val: JsValue) -> Result<JsValue, JsValue> {
    let req: GenerateRequest = serde_wasm_bindgen::from_value(val)?;
    let res = generate_inner(req).map_err(|e| JsValue::from_str(&e))?;
    Ok(serde_wasm_bindgen::to_value(&res)?)
}

#[cfg(feature = "wasm")]
#[wasm_bindgen]
pub fn forecast_scenario(val: JsValue) -> Result<JsValue, JsValue> {
    let req: ForecastRequest = serde_wasm_bindgen::from_value(val)?;
    let res = forecast_inner(req).map_err(|e| JsValue::from_str(&e))?;
    Ok(serde_wasm_bindgen::to_value(&res)?)
}

#[cfg(feature = "wasm")]
#[wasm_bindgen]
pub fn enforce_bounds(val: JsValue) -> Result<JsValue, JsValue> {
    let req: EnforceRequest = serde_wasm_bindgen::from_value(val)?;
    let res = enforce_inner(req).map_err(|e| JsValue::from_str(&e))?;
    Ok(serde_wasm_bindgen::to_value(&res)?)
}

/// JSON-in/JSON-out entry point for hosts without wasm-bindgen.
pub fn handle_json(operation: &str, request: &str) -> Result<String, String> {
    let response = match operation {
        "generate" => {
            let req: GenerateRequest = serde_json::from_str(request).map_err(|e| e.to_string())?;
            serde_json::to_value(generate_inner(req)?)
        }
        "forecast" => {
            let req: ForecastRequest = serde_json::from_str(request).map_err(|e| e.to_string())?;
            serde_json::to_value(forecast_inner(req)?)
        }
        "enforce" => {
            let req: EnforceRequest = serde_json::from_str(request).map_err(|e| e.to_string())?;
            serde_json::to_value(enforce_inner(req)?)
        }
        other => return Err(format!("Unknown operation '{}'", other)),
    };
    response.map(|v| v.to_string()).map_err(|e| e.to_string())
}

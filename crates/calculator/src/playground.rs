use kiradopay_core::ItemCode;

/// Render a TypeScript declaration of the calculator input for the given items.
///
/// Event owners paste this into a TypeScript playground to get type checking
/// while writing a calculator body.
pub fn state_shape(items: &[ItemCode]) -> String {
    let union = if items.is_empty() {
        "never".to_string()
    } else {
        items
            .iter()
            .map(|code| format!("\"{code}\""))
            .collect::<Vec<_>>()
            .join(" | ")
    };

    format!(
        "type Itemcode = {union};

interface RecordState {{
  count: number;
  dedication?: boolean;
}}

type State = {{
  [K in Itemcode]: RecordState;
}}

function calculate(state: State): number {{
  return 0;
}}
"
    )
}

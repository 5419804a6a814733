// Build container names. Labels would be committed into the image along with the
// container config, so build containers are recognized by name instead.
/// Length of the hex session ID appended to the configured container prefix
pub const SESSION_ID_LEN: usize = 12;

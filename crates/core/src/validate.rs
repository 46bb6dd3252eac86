//! Validierung und Bereinigung benutzergelieferter Strings
//!
//! Alles was der Server an andere Clients zurueckspiegelt (Kanalname,
//! Beschreibung, Chat, Kick/Bann-Begruendung) laeuft durch
//! `sanitize_text`: Steuerzeichen werden entfernt, CR/LF zu Leerzeichen
//! kollabiert. Das verhindert Terminal-Escape- und Nullbyte-Injektion.

/// Maximale Laenge eines Benutzernamens
pub const MAX_USERNAME_LEN: usize = 32;

/// Prueft ob ein Benutzername 1-32 ASCII-Zeichen aus
/// [a-z A-Z 0-9 _ -] ist.
///
/// Nicht-ASCII-Zeichen, Leerstrings und Interpunktion werden abgelehnt.
pub fn username_gueltig(name: &str) -> bool {
    if name.is_empty() || name.len() > MAX_USERNAME_LEN {
        return false;
    }
    name.chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Entfernt Steuerzeichen aus benutzergeliefertem Text.
///
/// CR und LF werden zu Leerzeichen, alle anderen Steuerzeichen
/// (Nullbytes, BEL, ANSI-Escapes) entfernt.
pub fn sanitize_text(s: &str) -> String {
    s.chars()
        .filter_map(|c| {
            if c == '\n' || c == '\r' {
                Some(' ')
            } else if c.is_control() {
                None
            } else {
                Some(c)
            }
        })
        .collect()
}

/// Kuerzt einen String auf hoechstens `max` Zeichen (an Zeichengrenzen)
pub fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

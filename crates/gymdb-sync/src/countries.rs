//! ISO 3166 alpha-3 codes for the federations that appear in elite WAG results.

const ISO3: &[(&str, &str)] = &[
    ("Algeria", "DZA"),
    ("Argentina", "ARG"),
    ("Armenia", "ARM"),
    ("Australia", "AUS"),
    ("Austria", "AUT"),
    ("Azerbaijan", "AZE"),
    ("Belarus", "BLR"),
    ("Belgium", "BEL"),
    ("Bolivia", "BOL"),
    ("Brazil", "BRA"),
    ("Bulgaria", "BGR"),
    ("Canada", "CAN"),
    ("Chile", "CHL"),
    ("China", "CHN"),
    ("Colombia", "COL"),
    ("Costa Rica", "CRI"),
    ("Croatia", "HRV"),
    ("Cuba", "CUB"),
    ("Cyprus", "CYP"),
    ("Czech Republic", "CZE"),
    ("Czechia", "CZE"),
    ("Denmark", "DNK"),
    ("Dominican Republic", "DOM"),
    ("Ecuador", "ECU"),
    ("Egypt", "EGY"),
    ("Estonia", "EST"),
    ("Finland", "FIN"),
    ("France", "FRA"),
    ("Georgia", "GEO"),
    ("Germany", "DEU"),
    ("Great Britain", "GBR"),
    ("Greece", "GRC"),
    ("Guatemala", "GTM"),
    ("Hong Kong", "HKG"),
    ("Hungary", "HUN"),
    ("Iceland", "ISL"),
    ("India", "IND"),
    ("Indonesia", "IDN"),
    ("Iran", "IRN"),
    ("Ireland", "IRL"),
    ("Israel", "ISR"),
    ("Italy", "ITA"),
    ("Jamaica", "JAM"),
    ("Japan", "JPN"),
    ("Kazakhstan", "KAZ"),
    ("Latvia", "LVA"),
    ("Lithuania", "LTU"),
    ("Luxembourg", "LUX"),
    ("Malaysia", "MYS"),
    ("Mexico", "MEX"),
    ("Moldova", "MDA"),
    ("Netherlands", "NLD"),
    ("New Zealand", "NZL"),
    ("North Korea", "PRK"),
    ("Norway", "NOR"),
    ("Panama", "PAN"),
    ("Peru", "PER"),
    ("Philippines", "PHL"),
    ("Poland", "POL"),
    ("Portugal", "PRT"),
    ("Puerto Rico", "PRI"),
    ("Romania", "ROU"),
    ("Russia", "RUS"),
    ("Serbia", "SRB"),
    ("Singapore", "SGP"),
    ("Slovakia", "SVK"),
    ("Slovenia", "SVN"),
    ("South Africa", "ZAF"),
    ("South Korea", "KOR"),
    ("Spain", "ESP"),
    ("Sri Lanka", "LKA"),
    ("Sweden", "SWE"),
    ("Switzerland", "CHE"),
    ("Taiwan", "TWN"),
    ("Thailand", "THA"),
    ("Trinidad and Tobago", "TTO"),
    ("Turkey", "TUR"),
    ("Ukraine", "UKR"),
    ("United Kingdom", "GBR"),
    ("United States", "USA"),
    ("USA", "USA"),
    ("Uruguay", "URY"),
    ("Uzbekistan", "UZB"),
    ("Venezuela", "VEN"),
    ("Vietnam", "VNM"),
];

/// Alpha-3 code for a country name, matched case-insensitively.
pub fn iso3_for(name: &str) -> Option<&'static str> {
    let name = name.trim();
    ISO3.iter()
        .find(|(country, _)| country.eq_ignore_ascii_case(name))
        .map(|(_, code)| *code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_ignores_case_and_padding() {
        assert_eq!(iso3_for("Taiwan"), Some("TWN"));
        assert_eq!(iso3_for(" great britain "), Some("GBR"));
        assert_eq!(iso3_for("USA"), Some("USA"));
        assert_eq!(iso3_for("Atlantis"), None);
    }
}
